//! Bundle management endpoints.
//!
//! - `GET /v2/bundles`                               — every stored version
//! - `GET /v2/bundles/:name`                         — versions of one bundle
//! - `GET|PUT|DELETE /v2/bundles/:name/versions/:version`
//! - `PATCH /v2/bundles/:name/versions/:version?enabled=true|false`

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use gort_data::DataAccess;
use gort_domain::Bundle;
use serde::Deserialize;

use super::{auth::authorize, api_error, error_response, list_response};
use crate::state::AppState;

pub async fn list_bundles(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["list"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.bundle_list().await {
        Ok(bundles) => list_response(bundles),
        Err(e) => error_response(e),
    }
}

pub async fn list_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.bundle_versions(&name).await {
        Ok(bundles) => list_response(bundles),
        Err(e) => error_response(e),
    }
}

pub async fn get_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.bundle_get(&name, &version).await {
        Ok(bundle) => Json(bundle).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn put_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
    Json(mut bundle): Json<Bundle>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["install"]).await {
        return error_response(e);
    }

    // The path is authoritative for the (name, version) key.
    bundle.name = name;
    bundle.version = version;
    for (command_name, command) in bundle.commands.iter_mut() {
        command.name = command_name.clone();
    }

    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.bundle_create(&bundle).await {
        Ok(()) => Json(bundle).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["uninstall"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    // Deleting the enabled version leaves the bundle with no enabled
    // version at all; nothing is re-enabled implicitly.
    match da.bundle_delete(&name, &version).await {
        Ok(()) => Json(serde_json::json!({ "deleted": format!("{name} {version}") }))
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchParams {
    pub enabled: Option<bool>,
}

pub async fn patch_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, version)): Path<(String, String)>,
    Query(params): Query<PatchParams>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "bundle", &["enable"]).await {
        return error_response(e);
    }
    let Some(enabled) = params.enabled else {
        return api_error(
            axum::http::StatusCode::BAD_REQUEST,
            "patch requires an enabled=true|false parameter",
        );
    };

    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    let result = if enabled {
        da.bundle_enable(&name, &version).await
    } else {
        da.bundle_disable(&name, &version).await
    };
    match result {
        Ok(()) => Json(serde_json::json!({
            "name": name,
            "version": version,
            "enabled": enabled,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
