use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which persistence backend backs the data access layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// Process-local maps. State is lost on restart.
    Memory,
    /// Relational storage over Postgres.
    Postgres,
}

impl Default for DatabaseBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    /// Postgres connection uri, e.g. `postgres://gort@localhost/gort`.
    #[serde(default)]
    pub uri: String,
    #[serde(default = "d_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            uri: String::new(),
            max_connections: d_max_connections(),
        }
    }
}

fn d_max_connections() -> u32 {
    8
}
