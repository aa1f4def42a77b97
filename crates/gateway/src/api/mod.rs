pub mod auth;
pub mod bootstrap;
pub mod bundles;
pub mod configs;
pub mod groups;
pub mod roles;
pub mod schedules;
pub mod users;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use gort_domain::Error;
use serde::Serialize;

use crate::state::AppState;

/// Build the full `/v2` API router.
///
/// `POST /v2/authenticate` and `POST /v2/bootstrap` are public; every
/// other endpoint authenticates the `X-Session-Token` header and runs a
/// command-level permission check inside its handler.
pub fn router() -> Router<AppState> {
    Router::new()
        // Authentication & bootstrap (public)
        .route("/v2/authenticate", post(auth::authenticate))
        .route("/v2/bootstrap", post(bootstrap::do_bootstrap))
        .route("/v2/healthz", get(healthz))
        // Users
        .route("/v2/users", get(users::list_users))
        .route("/v2/users/:name", get(users::get_user))
        .route("/v2/users/:name", put(users::put_user))
        .route("/v2/users/:name", delete(users::delete_user))
        .route("/v2/users/:name/groups", get(users::user_groups))
        // Groups
        .route("/v2/groups", get(groups::list_groups))
        .route("/v2/groups/:name", get(groups::get_group))
        .route("/v2/groups/:name", put(groups::put_group))
        .route("/v2/groups/:name", delete(groups::delete_group))
        .route("/v2/groups/:name/members", get(groups::list_members))
        .route("/v2/groups/:name/members/:user", put(groups::add_member))
        .route("/v2/groups/:name/members/:user", delete(groups::remove_member))
        .route("/v2/groups/:name/roles", get(groups::list_group_roles))
        .route("/v2/groups/:name/roles/:role", put(groups::add_group_role))
        .route("/v2/groups/:name/roles/:role", delete(groups::remove_group_role))
        // Roles
        .route("/v2/roles", get(roles::list_roles))
        .route("/v2/roles/:name", get(roles::get_role))
        .route("/v2/roles/:name", put(roles::put_role))
        .route("/v2/roles/:name", delete(roles::delete_role))
        .route("/v2/roles/:name/permissions", get(roles::list_role_permissions))
        .route(
            "/v2/roles/:name/bundles/:bundle/permissions/:permission",
            put(roles::add_role_permission),
        )
        .route(
            "/v2/roles/:name/bundles/:bundle/permissions/:permission",
            delete(roles::remove_role_permission),
        )
        // Bundles
        .route("/v2/bundles", get(bundles::list_bundles))
        .route("/v2/bundles/:name", get(bundles::list_versions))
        .route("/v2/bundles/:name/versions/:version", get(bundles::get_bundle))
        .route("/v2/bundles/:name/versions/:version", put(bundles::put_bundle))
        .route("/v2/bundles/:name/versions/:version", delete(bundles::delete_bundle))
        .route("/v2/bundles/:name/versions/:version", patch(bundles::patch_bundle))
        // Dynamic configurations
        .route("/v2/configs/:bundle", get(configs::list_bundle_configs))
        .route("/v2/configs/:bundle/:layer", get(configs::list_layer_configs))
        .route("/v2/configs/:bundle/:layer/:owner", get(configs::list_owner_configs))
        .route("/v2/configs/:bundle/:layer/:owner/:key", get(configs::list_key_configs))
        .route("/v2/configs/:bundle/:layer/:owner/:key", put(configs::put_config))
        .route("/v2/configs/:bundle/:layer/:owner/:key", delete(configs::delete_config))
        // Schedules
        .route("/v2/schedules", get(schedules::list_schedules))
        .route("/v2/schedules", put(schedules::create_schedule))
        .route("/v2/schedules/:id", delete(schedules::delete_schedule))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn healthz() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Translate an error kind into the uniform HTTP surface. Only this
/// boundary turns typed errors into status codes.
pub(crate) fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::EmptyValue(_)
        | Error::Unmarshal(_)
        | Error::Tokenize(_)
        | Error::AmbiguousCommand(_)
        | Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::AlreadyExists { .. } | Error::AdminUndeletable => StatusCode::CONFLICT,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::PermissionDenied => StatusCode::FORBIDDEN,
        Error::ReservedConfigKey(_) => StatusCode::PRECONDITION_FAILED,
        Error::DataInit(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Execution(_)
        | Error::Marshal(_)
        | Error::Io(_)
        | Error::Store(_)
        | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    api_error(status, err.to_string())
}

/// 200 with a JSON body, or 204 when the list is empty.
pub(crate) fn list_response<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(items).into_response()
    }
}
