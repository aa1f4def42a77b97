//! The persistence layer: one narrow interface over every durable
//! entity, backed interchangeably by process-local maps or Postgres.
//!
//! Both backends are exercised by the same conformance suite
//! ([`conformance`]); anything that passes against one must pass against
//! the other.

pub mod conformance;
pub mod holder;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Duration;
use gort_domain::{
    Bundle, CommandEntry, CommandRequest, CommandResponseEnvelope, DynamicConfiguration, Group,
    Permission, Result, Role, ScheduledCommand, Token, User,
};
use rand::RngCore;

pub use holder::DataAccessHolder;
pub use memory::MemoryDataAccess;
pub use postgres::PostgresDataAccess;

/// Shared handle to whichever backend is configured.
pub type DynDataAccess = Arc<dyn DataAccess>;

/// Typed CRUD over users, groups, roles, bundles, tokens, command
/// requests, schedules and dynamic configurations.
///
/// Multi-step operations (token regeneration, bundle enable) are atomic
/// inside a single method; callers must not assume atomicity across
/// distinct calls.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Create or verify backing storage. Safe to call more than once.
    async fn initialize(&self) -> Result<()>;

    // ── Users ─────────────────────────────────────────────────────────

    async fn user_create(&self, user: &User) -> Result<()>;
    async fn user_get(&self, username: &str) -> Result<User>;
    async fn user_get_by_email(&self, email: &str) -> Result<User>;
    async fn user_list(&self) -> Result<Vec<User>>;
    /// Update in place. An empty incoming `password_hash` keeps the
    /// stored one.
    async fn user_update(&self, user: &User) -> Result<()>;
    /// Cascades to the user's tokens and group memberships. The admin
    /// user is undeletable.
    async fn user_delete(&self, username: &str) -> Result<()>;
    async fn user_exists(&self, username: &str) -> Result<bool>;
    /// True iff the user exists and the password verifies against the
    /// stored hash. A missing user is an error, not `false`.
    async fn user_authenticate(&self, username: &str, password: &str) -> Result<bool>;
    async fn user_group_list(&self, username: &str) -> Result<Vec<Group>>;
    /// The flattened, deduplicated, lexicographically sorted
    /// `bundle:permission` strings reachable through the user's groups.
    async fn user_permission_list(&self, username: &str) -> Result<Vec<String>>;

    // ── Groups ────────────────────────────────────────────────────────

    async fn group_create(&self, group: &Group) -> Result<()>;
    async fn group_get(&self, name: &str) -> Result<Group>;
    async fn group_list(&self) -> Result<Vec<Group>>;
    async fn group_delete(&self, name: &str) -> Result<()>;
    async fn group_exists(&self, name: &str) -> Result<bool>;
    async fn group_user_add(&self, group: &str, username: &str) -> Result<()>;
    async fn group_user_delete(&self, group: &str, username: &str) -> Result<()>;
    async fn group_user_list(&self, group: &str) -> Result<Vec<User>>;
    async fn group_role_add(&self, group: &str, role: &str) -> Result<()>;
    async fn group_role_delete(&self, group: &str, role: &str) -> Result<()>;
    /// Sorted by role name.
    async fn group_role_list(&self, group: &str) -> Result<Vec<Role>>;

    // ── Roles ─────────────────────────────────────────────────────────

    async fn role_create(&self, name: &str) -> Result<()>;
    async fn role_get(&self, name: &str) -> Result<Role>;
    /// Sorted by role name.
    async fn role_list(&self) -> Result<Vec<Role>>;
    async fn role_delete(&self, name: &str) -> Result<()>;
    async fn role_exists(&self, name: &str) -> Result<bool>;
    async fn role_permission_add(&self, role: &str, bundle: &str, permission: &str) -> Result<()>;
    async fn role_permission_delete(
        &self,
        role: &str,
        bundle: &str,
        permission: &str,
    ) -> Result<()>;
    /// Sorted by `(bundle, permission)`.
    async fn role_permission_list(&self, role: &str) -> Result<Vec<Permission>>;
    async fn role_group_list(&self, role: &str) -> Result<Vec<Group>>;

    // ── Bundles ───────────────────────────────────────────────────────

    /// Validates the bundle and normalizes its image tag before storing.
    async fn bundle_create(&self, bundle: &Bundle) -> Result<()>;
    async fn bundle_get(&self, name: &str, version: &str) -> Result<Bundle>;
    async fn bundle_list(&self) -> Result<Vec<Bundle>>;
    async fn bundle_versions(&self, name: &str) -> Result<Vec<Bundle>>;
    /// Deleting the enabled version is permitted and must not implicitly
    /// enable another version.
    async fn bundle_delete(&self, name: &str, version: &str) -> Result<()>;
    /// Atomically clears any other enabled version of the same name.
    async fn bundle_enable(&self, name: &str, version: &str) -> Result<()>;
    async fn bundle_disable(&self, name: &str, version: &str) -> Result<()>;
    /// The enabled version string, or empty when none is enabled.
    async fn bundle_enabled_version(&self, name: &str) -> Result<String>;
    /// All matches across *enabled* bundle versions. `bundle` may be
    /// empty to search every enabled bundle. An empty vec is a
    /// successful no-match outcome.
    async fn find_command_entry(&self, bundle: &str, command: &str) -> Result<Vec<CommandEntry>>;

    // ── Tokens ────────────────────────────────────────────────────────

    /// Invalidates any existing token for the user, then issues a fresh
    /// one, inside the same operation.
    async fn token_generate(&self, username: &str, duration: Duration) -> Result<Token>;
    async fn token_retrieve_by_user(&self, username: &str) -> Result<Token>;
    async fn token_retrieve_by_token(&self, value: &str) -> Result<Token>;
    async fn token_invalidate(&self, value: &str) -> Result<()>;
    /// True iff the token exists and is not expired.
    async fn token_evaluate(&self, value: &str) -> Result<bool>;

    // ── Command requests ──────────────────────────────────────────────

    /// Assigns a fresh request id. Errors if the request already carries
    /// a non-zero id.
    async fn request_begin(&self, request: &mut CommandRequest) -> Result<()>;
    async fn request_update(&self, request: &CommandRequest) -> Result<()>;
    async fn request_error(&self, request: &CommandRequest, message: &str) -> Result<()>;
    /// Persists the final status and output. Requires a prior begin;
    /// updates after close are errors.
    async fn request_close(&self, envelope: &CommandResponseEnvelope) -> Result<()>;

    // ── Schedules ─────────────────────────────────────────────────────

    /// Assigns a fresh schedule id.
    async fn schedule_create(&self, schedule: &mut ScheduledCommand) -> Result<()>;
    async fn schedule_delete(&self, schedule_id: i64) -> Result<()>;
    /// All rows — used on startup to re-hydrate the cron wheel.
    async fn schedules_get(&self) -> Result<Vec<ScheduledCommand>>;

    // ── Dynamic configurations ────────────────────────────────────────

    /// Delete-then-create: setting an existing key overwrites it.
    async fn config_set(&self, config: &DynamicConfiguration) -> Result<()>;
    async fn config_delete(&self, layer: &str, bundle: &str, owner: &str, key: &str) -> Result<()>;
    /// Any of `layer`, `owner` and `key` may be `*`; `bundle` must be
    /// concrete.
    async fn config_list(
        &self,
        layer: &str,
        bundle: &str,
        owner: &str,
        key: &str,
    ) -> Result<Vec<DynamicConfiguration>>;
}

/// Number of random bytes behind every session token.
pub const TOKEN_ENTROPY_BYTES: usize = 64;

/// Mint an opaque token value: 64 bytes of OS entropy, URL-safe base64.
pub fn generate_token_value() -> String {
    let mut buf = [0u8; TOKEN_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_values_are_long_and_unique() {
        let a = generate_token_value();
        let b = generate_token_value();
        assert_ne!(a, b);
        // 64 bytes → 86 base64 characters without padding.
        assert_eq!(a.len(), 86);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
