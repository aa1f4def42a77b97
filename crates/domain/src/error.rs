/// Shared error type used across all Gort crates.
///
/// Every fallible operation in the persistence layer, the authorization
/// engine and the command pipeline returns one of these kinds. Only the
/// HTTP boundary translates them into status codes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A required input was blank (field name carried).
    #[error("{0} must not be empty")]
    EmptyValue(&'static str),

    /// A single entity lookup missed.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// A uniqueness constraint was violated.
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Missing, expired or unknown token.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but rule evaluation denied the invocation.
    #[error("permission denied")]
    PermissionDenied,

    /// The reserved admin user may never be removed.
    #[error("the admin user cannot be deleted")]
    AdminUndeletable,

    /// Write to a configuration key with a reserved prefix.
    #[error("configuration keys may not begin with {0}")]
    ReservedConfigKey(String),

    /// Malformed command input; message carries the 1-based position.
    #[error("{0}")]
    Tokenize(String),

    /// The command ran but failed (nonzero exit, timeout, launch failure).
    /// Not a pipeline fault — surfaced as an error envelope.
    #[error("command execution failed: {0}")]
    Execution(String),

    /// Codec failure while decoding an inbound payload.
    #[error("unmarshal: {0}")]
    Unmarshal(String),

    /// Codec failure while encoding an outbound payload.
    #[error("marshal: {0}")]
    Marshal(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// The data access backend could not be brought up.
    #[error("data access layer not ready: {0}")]
    DataInit(String),

    /// Backend storage failure (SQL driver, corrupted row, ...).
    #[error("data store: {0}")]
    Store(String),

    /// Invocation did not resolve to a unique command.
    #[error("ambiguous command {0}, qualify it as bundle:command")]
    AmbiguousCommand(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Wrap an arbitrary backend failure as a storage error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Unmarshal(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Unmarshal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
