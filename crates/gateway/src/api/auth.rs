//! Session authentication and the per-endpoint command guard.
//!
//! - `POST /v2/authenticate` — exchange credentials for a session token
//! - every protected handler calls [`authorize`] with the synthetic
//!   `gort` command it is equivalent to (e.g. `group create`), which
//!   authenticates `X-Session-Token` and evaluates the default bundle's
//!   rules for that command

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use chrono::Duration;
use gort_auth::authorize_command;
use gort_command::Value;
use gort_data::DataAccess;
use gort_domain::{Error, Result, User, ADMIN_USERNAME, DEFAULT_BUNDLE_NAME};
use serde::Deserialize;

use super::error_response;
use crate::state::AppState;

/// Header carrying the opaque session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v2/authenticate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
}

pub async fn authenticate(
    State(state): State<AppState>,
    Json(req): Json<AuthenticateRequest>,
) -> Response {
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };

    let verified = match da.user_authenticate(&req.username, &req.password).await {
        Ok(verified) => verified,
        // An unknown user surfaces exactly like a bad password.
        Err(Error::NotFound { .. }) => false,
        Err(e) => return error_response(e),
    };
    if !verified {
        tracing::info!(user = %req.username, "authentication rejected");
        return error_response(Error::Unauthorized);
    }

    let ttl = Duration::hours(state.config.global.token_ttl_hours as i64);
    match da.token_generate(&req.username, ttl).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => error_response(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_TOKEN_HEADER)?.to_str().ok()
}

/// Resolve `X-Session-Token` to a user. Accepts the short-lived service
/// token (as the admin principal) ahead of the token store.
pub(crate) async fn authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let presented = session_token(headers).ok_or(Error::Unauthorized)?;
    let da = state.data.get().await?;

    if state.service_token.accepts(presented) {
        return da.user_get(ADMIN_USERNAME).await;
    }

    let token = da.token_retrieve_by_token(presented).await?;
    if token.is_expired() {
        return Err(Error::Unauthorized);
    }
    da.user_get(&token.user).await
}

/// Authenticate the request and evaluate the default bundle's rules for
/// the synthetic invocation `gort:<command> <args...>` the endpoint is
/// declared equivalent to.
pub(crate) async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    command: &str,
    args: &[&str],
) -> Result<User> {
    let user = authenticated_user(state, headers).await?;
    let da = state.data.get().await?;

    let mut entries = da
        .find_command_entry(DEFAULT_BUNDLE_NAME, command)
        .await?;
    // No enabled default bundle means no rule can grant access.
    let entry = if entries.is_empty() {
        return Err(Error::PermissionDenied);
    } else {
        entries.remove(0)
    };

    let values: Vec<Value> = args
        .iter()
        .map(|a| Value::String {
            text: (*a).to_owned(),
            quote: '\u{0}',
        })
        .collect();
    authorize_command(da.as_ref(), &user.username, &entry, &values).await?;
    Ok(user)
}
