//! Session tokens: opaque random strings bound to exactly one user.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A bearer token issued by `token_generate`.
///
/// The value is 64 bytes of OS entropy, URL-safe base64 encoded — never a
/// JWT. A user holds at most one live token; generating a new one
/// invalidates the previous inside the same storage operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub token: String,
    pub user: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl Token {
    /// Build a token record valid from now (UTC) for `duration`.
    pub fn new(token: String, user: String, duration: Duration) -> Self {
        let valid_from = Utc::now();
        Self {
            token,
            user,
            valid_from,
            valid_until: valid_from + duration,
        }
    }

    /// A token is expired exactly when `valid_until <= now`.
    pub fn is_expired(&self) -> bool {
        self.valid_until <= Utc::now()
    }

    pub fn duration(&self) -> Duration {
        self.valid_until - self.valid_from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_expired() {
        let t = Token::new("abc".into(), "admin".into(), Duration::minutes(10));
        assert!(!t.is_expired());
        assert_eq!(t.duration(), Duration::minutes(10));
    }

    #[test]
    fn zero_duration_token_is_expired() {
        let t = Token::new("abc".into(), "admin".into(), Duration::zero());
        assert!(t.is_expired());
    }
}
