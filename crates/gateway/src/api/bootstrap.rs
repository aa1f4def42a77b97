//! `POST /v2/bootstrap` — one-shot first-user provisioning.

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use gort_data::DataAccess;
use gort_domain::User;
use serde::Deserialize;

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BootstrapRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password: String,
}

/// Provision the first user. Blank fields are filled in (the username
/// becomes `admin`, the password is generated and returned exactly
/// once). A repeat call conflicts with 409.
pub async fn do_bootstrap(
    State(state): State<AppState>,
    Json(req): Json<BootstrapRequest>,
) -> Response {
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };

    let requested = User {
        username: req.username,
        email: req.email,
        full_name: req.full_name,
        ..User::default()
    };
    match gort_auth::bootstrap(da.as_ref(), &requested, &req.password).await {
        Ok(result) => Json(serde_json::json!({
            "user": result.user,
            "password": result.generated_password,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
