//! Short-lived service-token principal.
//!
//! When the `GORT_SERVICE_TOKEN` environment variable is set, presenting
//! that exact value authenticates as the admin principal for ten seconds
//! counted from its first presentation. The expected value is read once
//! at startup and kept only as a SHA-256 digest; comparisons are
//! constant time.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const SERVICE_TOKEN_ENV: &str = "GORT_SERVICE_TOKEN";

const SERVICE_TOKEN_TTL: Duration = Duration::from_secs(10);

pub struct ServiceTokenWindow {
    expected_hash: Option<[u8; 32]>,
    first_seen: Mutex<Option<Instant>>,
    ttl: Duration,
}

impl ServiceTokenWindow {
    /// Read `GORT_SERVICE_TOKEN` once. An unset or empty variable
    /// disables the window entirely.
    pub fn from_env() -> Self {
        let expected_hash = std::env::var(SERVICE_TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .map(|token| Sha256::digest(token.as_bytes()).into());
        if expected_hash.is_some() {
            tracing::info!("service token window enabled ({}s ttl)", SERVICE_TOKEN_TTL.as_secs());
        }
        Self::new(expected_hash, SERVICE_TOKEN_TTL)
    }

    fn new(expected_hash: Option<[u8; 32]>, ttl: Duration) -> Self {
        Self {
            expected_hash,
            first_seen: Mutex::new(None),
            ttl,
        }
    }

    /// True iff `presented` matches the configured token and the window
    /// has not lapsed. The first successful presentation starts the
    /// countdown.
    pub fn accepts(&self, presented: &str) -> bool {
        let Some(expected) = &self.expected_hash else {
            return false;
        };
        let provided: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        if !bool::from(provided.ct_eq(expected)) {
            return false;
        }

        let mut first_seen = self.first_seen.lock();
        let started = *first_seen.get_or_insert_with(Instant::now);
        started.elapsed() <= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(token: &str, ttl: Duration) -> ServiceTokenWindow {
        ServiceTokenWindow::new(Some(Sha256::digest(token.as_bytes()).into()), ttl)
    }

    #[test]
    fn disabled_without_configuration() {
        let w = ServiceTokenWindow::new(None, SERVICE_TOKEN_TTL);
        assert!(!w.accepts("anything"));
    }

    #[test]
    fn accepts_only_the_exact_token() {
        let w = window("svc-token", SERVICE_TOKEN_TTL);
        assert!(!w.accepts("wrong"));
        assert!(w.accepts("svc-token"));
        assert!(w.accepts("svc-token"));
    }

    #[test]
    fn window_lapses_after_ttl() {
        let w = window("svc-token", Duration::from_millis(20));
        assert!(w.accepts("svc-token"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!w.accepts("svc-token"));
    }
}
