//! Role management endpoints.
//!
//! - `GET /v2/roles`, `GET|PUT|DELETE /v2/roles/:name`
//! - `GET /v2/roles/:name/permissions`
//! - `PUT|DELETE /v2/roles/:name/bundles/:bundle/permissions/:permission`

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};

use super::{auth::authorize, error_response, list_response};
use crate::state::AppState;

pub async fn list_roles(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["list"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_list().await {
        Ok(roles) => list_response(roles),
        Err(e) => error_response(e),
    }
}

pub async fn get_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_get(&name).await {
        Ok(role) => Json(role).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn put_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["create"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_create(&name).await {
        Ok(()) => Json(serde_json::json!({ "name": name })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["delete"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_delete(&name).await {
        Ok(()) => Json(serde_json::json!({ "deleted": name })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_role_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_permission_list(&name).await {
        Ok(permissions) => list_response(permissions),
        Err(e) => error_response(e),
    }
}

pub async fn add_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, bundle, permission)): Path<(String, String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["grant"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_permission_add(&name, &bundle, &permission).await {
        Ok(()) => Json(serde_json::json!({
            "role": name,
            "permission": format!("{bundle}:{permission}"),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn remove_role_permission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, bundle, permission)): Path<(String, String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "role", &["revoke"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.role_permission_delete(&name, &bundle, &permission).await {
        Ok(()) => Json(serde_json::json!({
            "role": name,
            "permission": format!("{bundle}:{permission}"),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}
