//! Durable scheduled commands: cron-bound re-issuers of a command line.

use serde::{Deserialize, Serialize};

/// A command invocation re-issued on a cron cadence on behalf of the user
/// who created it.
///
/// Only the original string form of the command is stored; it is
/// re-tokenized and re-resolved when the scheduler hydrates, so a
/// schedule always runs against whichever bundle version is enabled at
/// fire time.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScheduledCommand {
    /// Server-assigned, unique across the store. Zero before creation.
    #[serde(default)]
    pub schedule_id: i64,
    /// Standard 5-field cron expression, or `@every <duration>`.
    pub cron: String,
    /// The command line exactly as the user typed it.
    pub command: String,
    pub adapter: String,
    pub channel_id: String,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
}
