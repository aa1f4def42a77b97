//! Schedule endpoints.
//!
//! - `PUT    /v2/schedules`     — create; responds with the schedule id
//!   as decimal text
//! - `GET    /v2/schedules`     — list durable rows (204 when empty)
//! - `DELETE /v2/schedules/:id` — cancel (row first, then the live job)

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use gort_auth::authorize_command;
use gort_command::infer::{infer, InferOptions, Value};
use gort_data::DataAccess;
use gort_domain::{Result, ScheduledCommand};

use super::{auth::authorize, error_response, list_response};
use crate::dispatch::resolve_command_line;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct ScheduleRequest {
    pub cron: String,
    pub command: String,
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub channel_id: String,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<ScheduleRequest>,
) -> Response {
    let user = match authorize(&state, &headers, "schedule", &["create"]).await {
        Ok(user) => user,
        Err(e) => return error_response(e),
    };

    // The scheduled command itself must be one the owner may run —
    // schedules are created only after this check passes.
    if let Err(e) = authorize_target_command(&state, &user.username, &req.command).await {
        return error_response(e);
    }

    let mut schedule = ScheduledCommand {
        schedule_id: 0,
        cron: req.cron,
        command: req.command,
        adapter: req.adapter,
        channel_id: req.channel_id,
        user_id: user
            .mappings
            .values()
            .next()
            .cloned()
            .unwrap_or_default(),
        user_email: user.email.clone(),
        user_name: user.username.clone(),
    };
    match state.scheduler.create(&mut schedule).await {
        Ok(schedule_id) => schedule_id.to_string().into_response(),
        Err(e) => error_response(e),
    }
}

async fn authorize_target_command(state: &AppState, username: &str, raw: &str) -> Result<()> {
    let da = state.data.get().await?;
    let (entry, parameters) = resolve_command_line(da.as_ref(), raw).await?;
    let args: Vec<Value> = parameters
        .iter()
        .map(|p| infer(p, InferOptions::default()))
        .collect::<Result<_>>()?;
    authorize_command(da.as_ref(), username, &entry, &args).await
}

pub async fn list_schedules(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers, "schedule", &["list"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.schedules_get().await {
        Ok(schedules) => list_response(schedules),
        Err(e) => error_response(e),
    }
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "schedule", &["delete"]).await {
        return error_response(e);
    }
    match state.scheduler.cancel(id).await {
        Ok(()) => axum::Json(serde_json::json!({ "deleted": id })).into_response(),
        Err(e) => error_response(e),
    }
}
