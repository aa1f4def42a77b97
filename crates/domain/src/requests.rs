//! Command request lifecycle records and the response envelope handed
//! back to chat adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundles::CommandEntry;

/// The persistent record of one command invocation.
///
/// `request_id` is zero until `request_begin` assigns a fresh id; after
/// that it is unique and monotonic for the lifetime of the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub request_id: i64,
    pub entry: CommandEntry,
    /// Chat adapter the invocation arrived on (`slack`, `discord`, ...).
    pub adapter: String,
    pub channel_id: String,
    /// Rendered argument list, in order, as passed to the workload.
    pub parameters: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
}

impl CommandRequest {
    /// The `bundle:command arg...` form, used for logging and audit rows.
    pub fn command_string(&self) -> String {
        let mut s = format!(
            "{}:{}",
            self.entry.bundle.name, self.entry.command.name
        );
        for p in &self.parameters {
            s.push(' ');
            s.push_str(p);
        }
        s
    }
}

/// Workload output collected by the pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Raw output split into lines, template context for the renderer.
    pub lines: Vec<String>,
    /// The unsplit output.
    pub out: String,
    pub is_error: bool,
}

/// Execution metadata attached to the envelope.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResponseData {
    pub exit_code: i32,
    pub duration_ms: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything an adapter needs to render a reply: the original request
/// (for template context), the output, and the execution metadata.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandResponseEnvelope {
    pub request: CommandRequest,
    pub response: CommandResponse,
    pub data: ResponseData,
}

impl CommandResponseEnvelope {
    /// Envelope for a workload that ran and produced output.
    pub fn with_output(request: CommandRequest, out: String, exit_code: i32, duration_ms: i64) -> Self {
        let lines: Vec<String> = out.lines().map(str::to_owned).collect();
        Self {
            request,
            response: CommandResponse {
                lines,
                out,
                is_error: exit_code != 0,
            },
            data: ResponseData {
                exit_code,
                duration_ms,
                error: None,
            },
        }
    }

    /// Envelope for an invocation that never produced output (denied,
    /// launch failure, infrastructure error).
    pub fn with_error(request: CommandRequest, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            request,
            response: CommandResponse {
                lines: vec![error.clone()],
                out: error.clone(),
                is_error: true,
            },
            data: ResponseData {
                exit_code: -1,
                duration_ms: 0,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundles::{Bundle, BundleCommand};

    fn request() -> CommandRequest {
        CommandRequest {
            entry: CommandEntry {
                bundle: Bundle {
                    name: "echo".into(),
                    ..Bundle::default()
                },
                command: BundleCommand {
                    name: "echo".into(),
                    ..BundleCommand::default()
                },
            },
            parameters: vec!["-n".into(), "hi".into()],
            timestamp: Utc::now(),
            ..CommandRequest::default()
        }
    }

    #[test]
    fn command_string_includes_parameters() {
        assert_eq!(request().command_string(), "echo:echo -n hi");
    }

    #[test]
    fn error_envelope_is_marked() {
        let env = CommandResponseEnvelope::with_error(request(), "permission denied");
        assert!(env.response.is_error);
        assert_eq!(env.data.error.as_deref(), Some("permission denied"));
        assert_eq!(env.data.exit_code, -1);
    }

    #[test]
    fn output_envelope_splits_lines() {
        let env = CommandResponseEnvelope::with_output(request(), "a\nb\n".into(), 0, 12);
        assert_eq!(env.response.lines, vec!["a", "b"]);
        assert!(!env.response.is_error);
    }
}
