//! Identity entities: users, groups, roles and permissions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A person (or service) allowed to invoke commands.
///
/// `username` is the primary key and never changes. The password is only
/// ever stored as a bcrypt digest; the digest is skipped when a user is
/// serialized onto a response surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    /// Chat adapter name → external user id (e.g. `"slack" → "U012ABC"`).
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

/// A named collection of users. Membership lives in a linking set owned by
/// the persistence layer, not on the struct itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub name: String,
}

/// A named collection of permissions, assignable to groups.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub name: String,
}

/// A permission declared by a bundle and attached to roles.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permission {
    pub bundle_name: String,
    pub name: String,
}

impl Permission {
    pub fn new(bundle_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Permission {
    /// The canonical `bundle:permission` spelling used by rules and by
    /// `user_permission_list`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bundle_name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_display_is_colon_joined() {
        let p = Permission::new("gort", "manage_users");
        assert_eq!(p.to_string(), "gort:manage_users");
    }

    #[test]
    fn user_serialization_skips_password_hash() {
        let user = User {
            username: "jsmith".into(),
            email: "jsmith@example.com".into(),
            full_name: "Jo Smith".into(),
            password_hash: "$2b$10$secret".into(),
            mappings: HashMap::new(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("jsmith@example.com"));
    }
}
