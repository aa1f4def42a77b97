//! Command-level authorization.
//!
//! The decision is a total function of the user's persisted state, the
//! resolved bundle command and the parsed invocation — nothing is cached
//! across calls.

use std::collections::HashSet;

use gort_command::rules;
use gort_command::Value;
use gort_data::DataAccess;
use gort_domain::{CommandEntry, Error, Result};

/// Authorize `username` to run `entry` with the given positional
/// arguments.
///
/// The user's transitive permission set is resolved through groups and
/// roles, then the command's rule list is evaluated: an empty list
/// denies by default, and every rule whose guard fires must have its
/// permission requirement met.
pub async fn authorize_command(
    da: &dyn DataAccess,
    username: &str,
    entry: &CommandEntry,
    args: &[Value],
) -> Result<()> {
    let permissions: HashSet<String> = da
        .user_permission_list(username)
        .await?
        .into_iter()
        .collect();

    let parsed = rules::parse_rules(&entry.bundle.name, &entry.command.rules)?;
    if rules::evaluate(&parsed, args, &permissions) {
        Ok(())
    } else {
        tracing::debug!(
            user = username,
            bundle = %entry.bundle.name,
            command = %entry.command.name,
            "rule evaluation denied invocation"
        );
        Err(Error::PermissionDenied)
    }
}
