//! Dynamic configuration endpoints.
//!
//! - `GET /v2/configs/:bundle[/:layer[/:owner[/:key]]]` — list; omitted
//!   trailing segments and `*` both act as wildcards, but the bundle
//!   segment must be concrete
//! - `PUT /v2/configs/:bundle/:layer/:owner/:key` — set (reserved
//!   `GORT_` keys are rejected with 412)
//! - `DELETE /v2/configs/:bundle/:layer/:owner/:key`
//!
//! Secret values are masked on every response surface; only the
//! workload environment sees them in the clear.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use gort_data::DataAccess;
use gort_domain::{ConfigLayer, DynamicConfiguration, Error};
use serde::Deserialize;

use super::{api_error, auth::authorize, error_response, list_response};
use crate::state::AppState;

/// Layer segments must be a known layer name or `*`.
fn check_layer(layer: &str) -> Result<(), Error> {
    if layer == "*" {
        return Ok(());
    }
    layer.parse::<ConfigLayer>().map(|_| ())
}

async fn list_configs(
    state: &AppState,
    headers: &HeaderMap,
    bundle: &str,
    layer: &str,
    owner: &str,
    key: &str,
) -> Response {
    if let Err(e) = authorize(state, headers, "config", &["list"]).await {
        return error_response(e);
    }
    if bundle == "*" || bundle.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "config bundle must be concrete");
    }
    if let Err(e) = check_layer(layer) {
        return error_response(e);
    }
    // "-" addresses the owner-less bundle layer in a URL segment.
    let owner = if owner == "-" { "" } else { owner };
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.config_list(layer, bundle, owner, key).await {
        Ok(configs) => {
            let redacted: Vec<DynamicConfiguration> =
                configs.iter().map(DynamicConfiguration::redacted).collect();
            list_response(redacted)
        }
        Err(e) => error_response(e),
    }
}

pub async fn list_bundle_configs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(bundle): Path<String>,
) -> Response {
    list_configs(&state, &headers, &bundle, "*", "*", "*").await
}

pub async fn list_layer_configs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((bundle, layer)): Path<(String, String)>,
) -> Response {
    list_configs(&state, &headers, &bundle, &layer, "*", "*").await
}

pub async fn list_owner_configs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((bundle, layer, owner)): Path<(String, String, String)>,
) -> Response {
    list_configs(&state, &headers, &bundle, &layer, &owner, "*").await
}

pub async fn list_key_configs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((bundle, layer, owner, key)): Path<(String, String, String, String)>,
) -> Response {
    list_configs(&state, &headers, &bundle, &layer, &owner, &key).await
}

#[derive(Debug, Deserialize)]
pub struct ConfigSpec {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

pub async fn put_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((bundle, layer, owner, key)): Path<(String, String, String, String)>,
    Json(spec): Json<ConfigSpec>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "config", &["set"]).await {
        return error_response(e);
    }
    let layer = match layer.parse::<ConfigLayer>() {
        Ok(layer) => layer,
        Err(e) => return error_response(e),
    };
    // The bundle layer is owner-less; the path spells that as "-".
    let owner = if owner == "-" { String::new() } else { owner };

    let config = DynamicConfiguration {
        layer,
        bundle,
        owner,
        key,
        value: spec.value,
        secret: spec.secret,
    };
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.config_set(&config).await {
        Ok(()) => Json(config.redacted()).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((bundle, layer, owner, key)): Path<(String, String, String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "config", &["delete"]).await {
        return error_response(e);
    }
    if let Err(e) = check_layer(&layer) {
        return error_response(e);
    }
    let owner = if owner == "-" { String::new() } else { owner };
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.config_delete(&layer, &bundle, &owner, &key).await {
        Ok(()) => Json(serde_json::json!({
            "deleted": format!("{bundle}/{layer}/{owner}/{key}"),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
