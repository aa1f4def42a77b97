//! Client profile file: `~/.gort/profile`, YAML.
//!
//! ```yaml
//! defaults:
//!   profile: gort
//! gort:
//!   url: https://gort.example.com:4000
//!   user: admin
//!   password: "..."
//!   allow_insecure: false
//!   tls_cert_file: ""
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gort_domain::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileDefaults {
    #[serde(default)]
    pub profile: String,
}

/// One named profile entry. `name` is the map key, filled on load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileEntry {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub allow_insecure: bool,
    #[serde(default)]
    pub tls_cert_file: String,
}

/// The whole profile file: a `defaults` section plus named entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Profiles {
    #[serde(default)]
    pub defaults: ProfileDefaults,
    #[serde(flatten)]
    pub profiles: HashMap<String, ProfileEntry>,
}

impl Profiles {
    /// `~/.gort/profile`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?;
        Ok(home.join(".gort").join("profile"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut profiles: Profiles = serde_yaml::from_str(&raw)?;
        for (name, entry) in profiles.profiles.iter_mut() {
            entry.name = name.clone();
        }
        Ok(profiles)
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered =
            serde_yaml::to_string(self).map_err(|e| Error::Marshal(e.to_string()))?;
        std::fs::write(path, rendered)?;
        Ok(())
    }

    pub fn save_default(&self) -> Result<()> {
        self.save(&Self::default_path()?)
    }

    /// Insert an entry; the first profile written becomes the default.
    pub fn insert(&mut self, name: String, mut entry: ProfileEntry) {
        entry.name = name.clone();
        if self.defaults.profile.is_empty() {
            self.defaults.profile = name.clone();
        }
        self.profiles.insert(name, entry);
    }

    /// The entry named by `defaults.profile`, if any.
    pub fn default_entry(&self) -> Option<&ProfileEntry> {
        self.profiles.get(&self.defaults.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_YAML: &str = r#"
defaults:
  profile: gort
gort:
  url: https://gort.example.com:4000
  user: admin
  password: hunter2
  allow_insecure: false
  tls_cert_file: ""
staging:
  url: http://localhost:4000
  user: admin
  password: devdev
  allow_insecure: true
"#;

    #[test]
    fn parses_defaults_and_named_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile");
        std::fs::write(&path, PROFILE_YAML).unwrap();

        let profiles = Profiles::load(&path).unwrap();
        assert_eq!(profiles.defaults.profile, "gort");
        assert_eq!(profiles.profiles.len(), 2);

        let default = profiles.default_entry().unwrap();
        assert_eq!(default.name, "gort");
        assert_eq!(default.url, "https://gort.example.com:4000");
        assert!(!default.allow_insecure);
        assert!(profiles.profiles["staging"].allow_insecure);
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profile");

        let mut profiles = Profiles::default();
        profiles.insert(
            "gort".into(),
            ProfileEntry {
                url: "https://example.com".into(),
                user: "admin".into(),
                password: "pw".into(),
                ..ProfileEntry::default()
            },
        );
        profiles.save(&path).unwrap();

        let reloaded = Profiles::load(&path).unwrap();
        assert_eq!(reloaded.defaults.profile, "gort");
        assert_eq!(reloaded.default_entry().unwrap().user, "admin");
    }
}
