//! Core domain types shared by every Gort crate: durable entities, the
//! error taxonomy and the server configuration model.

pub mod bundles;
pub mod config;
pub mod configs;
pub mod error;
pub mod requests;
pub mod schedules;
pub mod tokens;
pub mod users;

pub use bundles::{Bundle, BundleCommand, CommandEntry, Templates};
pub use configs::{ConfigLayer, DynamicConfiguration, RESERVED_CONFIG_PREFIX};
pub use error::{Error, Result};
pub use requests::{CommandRequest, CommandResponse, CommandResponseEnvelope, ResponseData};
pub use schedules::ScheduledCommand;
pub use tokens::Token;
pub use users::{Group, Permission, Role, User};

/// The reserved administrator account. It is provisioned by bootstrap and
/// can never be deleted.
pub const ADMIN_USERNAME: &str = "admin";

/// Group and role created by bootstrap alongside the admin user.
pub const ADMIN_GROUP: &str = "admin";
pub const ADMIN_ROLE: &str = "admin";

/// Permissions granted to the admin role at bootstrap, and the full set
/// declared by the default bundle.
pub const ADMIN_PERMISSIONS: [&str; 5] = [
    "manage_commands",
    "manage_configs",
    "manage_groups",
    "manage_roles",
    "manage_users",
];

/// Name of the built-in command bundle installed at bootstrap.
pub const DEFAULT_BUNDLE_NAME: &str = "gort";
