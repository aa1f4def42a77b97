//! The command dispatch pipeline:
//! tokenize → parse → resolve → authorize → execute → respond.
//!
//! The pipeline is re-entrant; any number of requests may be in flight.
//! The only ordering guarantee is per-request: `request_begin` happens
//! before its `request_close`, and a request that was begun is closed
//! on every exit path.

pub mod environment;
pub mod worker;

use std::time::Duration;

use chrono::Utc;
use gort_auth::authorize_command;
use gort_command::infer::{infer, InferOptions, Value};
use gort_command::ParsedCommand;
use gort_data::DataAccess;
use gort_domain::{
    CommandEntry, CommandRequest, CommandResponseEnvelope, Error, Result, User,
};
use tokio::sync::mpsc;

use crate::state::AppState;
use worker::WorkRequest;

/// Who asked for a command to run, and where the reply goes.
#[derive(Clone, Debug)]
pub struct CommandIssuer {
    pub adapter: String,
    pub channel_id: String,
    pub user: User,
}

/// Resolve a parsed invocation to a single enabled `(bundle, command)`.
///
/// Zero candidates is a not-found; more than one means the command name
/// is exported by several enabled bundles and must be qualified.
pub async fn resolve(da: &dyn DataAccess, parsed: &ParsedCommand) -> Result<CommandEntry> {
    let mut entries = da
        .find_command_entry(&parsed.bundle, &parsed.command)
        .await?;
    match entries.len() {
        0 => Err(Error::not_found("command", parsed.command.clone())),
        1 => Ok(entries.remove(0)),
        _ => Err(Error::AmbiguousCommand(parsed.command.clone())),
    }
}

/// Tokenize, parse and resolve a raw command line. Returns the resolved
/// entry plus the rendered argument list.
pub async fn resolve_command_line(
    da: &dyn DataAccess,
    raw: &str,
) -> Result<(CommandEntry, Vec<String>)> {
    let parsed = ParsedCommand::from_input(raw, InferOptions::default())?;
    let entry = resolve(da, &parsed).await?;
    Ok((entry, parsed.parameter_strings()))
}

/// Full pipeline entry point for adapter-originated command lines.
pub async fn handle_command_line(
    state: &AppState,
    raw: &str,
    issuer: &CommandIssuer,
) -> Result<CommandResponseEnvelope> {
    let da = state.data.get().await?;
    let (entry, parameters) = resolve_command_line(da.as_ref(), raw).await?;

    let request = CommandRequest {
        request_id: 0,
        entry,
        adapter: issuer.adapter.clone(),
        channel_id: issuer.channel_id.clone(),
        parameters,
        timestamp: Utc::now(),
        user_id: issuer
            .user
            .mappings
            .get(&issuer.adapter)
            .cloned()
            .unwrap_or_default(),
        user_email: issuer.user.email.clone(),
        user_name: issuer.user.username.clone(),
    };
    execute_request(state, request).await
}

/// Run one lifecycle: begin (when not already begun), authorize,
/// execute, close. Scheduled requests arrive here already begun.
pub async fn execute_request(
    state: &AppState,
    mut request: CommandRequest,
) -> Result<CommandResponseEnvelope> {
    let da = state.data.get().await?;
    if request.request_id == 0 {
        da.request_begin(&mut request).await?;
    }

    let args: Vec<Value> = request
        .parameters
        .iter()
        .map(|p| infer(p, InferOptions::default()))
        .collect::<Result<_>>()?;

    if let Err(e) = authorize_command(da.as_ref(), &request.user_name, &request.entry, &args).await
    {
        return match e {
            Error::PermissionDenied => {
                da.request_error(&request, "permission denied").await?;
                let envelope =
                    CommandResponseEnvelope::with_error(request, "permission denied");
                da.request_close(&envelope).await?;
                Ok(envelope)
            }
            // Infrastructure fault: close the begun row on the way out,
            // then surface the fault itself.
            fault => {
                let envelope =
                    CommandResponseEnvelope::with_error(request.clone(), fault.to_string());
                if let Err(close_err) = da.request_close(&envelope).await {
                    tracing::error!(
                        request_id = request.request_id,
                        error = %close_err,
                        "failed to close faulted request"
                    );
                }
                Err(fault)
            }
        };
    }

    let env = match environment::layered_environment(da.as_ref(), &request).await {
        Ok(env) => env,
        Err(fault) => {
            let envelope =
                CommandResponseEnvelope::with_error(request.clone(), fault.to_string());
            da.request_close(&envelope).await.ok();
            return Err(fault);
        }
    };
    let mut argv = request.entry.command.executable.clone();
    argv.extend(request.parameters.iter().cloned());
    let work = WorkRequest {
        image: request.entry.bundle.image.clone(),
        argv,
        env,
        timeout: Duration::from_secs(state.config.global.command_timeout_secs),
    };

    let envelope = match state.worker.execute(&work).await {
        Ok(result) => {
            let out = if result.exit_code != 0 && result.stdout.is_empty() {
                result.stderr
            } else {
                result.stdout
            };
            CommandResponseEnvelope::with_output(
                request,
                out,
                result.exit_code,
                result.duration_ms,
            )
        }
        // Driver errors (timeout, launch failure) become execution-error
        // envelopes, not pipeline faults.
        Err(Error::Execution(message)) => CommandResponseEnvelope::with_error(request, message),
        Err(fault) => {
            let envelope =
                CommandResponseEnvelope::with_error(request.clone(), fault.to_string());
            da.request_close(&envelope).await.ok();
            return Err(fault);
        }
    };

    da.request_close(&envelope).await?;
    Ok(envelope)
}

/// Consume the bounded request queue, executing each request on its own
/// task. Dispatch is parallel; there is no global ordering.
pub fn spawn_dispatcher(state: AppState, mut rx: mpsc::Receiver<CommandRequest>) {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let state = state.clone();
            tokio::spawn(async move {
                let request_id = request.request_id;
                match execute_request(&state, request).await {
                    Ok(envelope) => {
                        tracing::info!(
                            request_id,
                            exit_code = envelope.data.exit_code,
                            is_error = envelope.response.is_error,
                            "dispatched request finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(request_id, error = %e, "dispatched request faulted");
                    }
                }
            });
        }
        tracing::info!("dispatcher queue closed");
    });
}
