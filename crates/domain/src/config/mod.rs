mod database;
mod server;

pub use database::*;
pub use server::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub global: GlobalConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Global
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Wall-clock limit for a single command workload, in seconds.
    #[serde(default = "d_command_timeout")]
    pub command_timeout_secs: u64,
    /// Lifetime of session tokens issued by `/v2/authenticate`.
    #[serde(default = "d_token_ttl")]
    pub token_ttl_hours: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: d_command_timeout(),
            token_ttl_hours: d_token_ttl(),
        }
    }
}

fn d_command_timeout() -> u64 {
    60
}

fn d_token_ttl() -> u64 {
    24
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.database.backend == DatabaseBackend::Postgres && self.database.uri.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "database.uri".into(),
                message: "postgres backend requires a connection uri".into(),
            });
        }

        if self.database.backend == DatabaseBackend::Memory {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "database.backend".into(),
                message: "in-memory backend loses all state on restart".into(),
            });
        }

        if self.global.command_timeout_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "global.command_timeout_secs".into(),
                message: "command timeout must be greater than 0".into(),
            });
        }

        issues
    }
}
