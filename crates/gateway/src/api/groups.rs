//! Group management endpoints.
//!
//! - `GET|PUT|DELETE /v2/groups[/:name]`
//! - `GET /v2/groups/:name/members`, `PUT|DELETE .../members/:user`
//! - `GET /v2/groups/:name/roles`,   `PUT|DELETE .../roles/:role`

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use gort_data::DataAccess;
use gort_domain::Group;

use super::{auth::authorize, error_response, list_response};
use crate::state::AppState;

pub async fn list_groups(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["list"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_list().await {
        Ok(groups) => list_response(groups),
        Err(e) => error_response(e),
    }
}

pub async fn get_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_get(&name).await {
        Ok(group) => Json(group).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn put_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["create"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    let group = Group { name };
    match da.group_create(&group).await {
        Ok(()) => Json(group).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["delete"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_delete(&name).await {
        Ok(()) => Json(serde_json::json!({ "deleted": name })).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Members ─────────────────────────────────────────────────────────

pub async fn list_members(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_user_list(&name).await {
        Ok(users) => list_response(users),
        Err(e) => error_response(e),
    }
}

pub async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, user)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["add-user"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_user_add(&name, &user).await {
        Ok(()) => Json(serde_json::json!({ "group": name, "user": user })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, user)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["remove-user"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_user_delete(&name, &user).await {
        Ok(()) => Json(serde_json::json!({ "group": name, "user": user })).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Roles ───────────────────────────────────────────────────────────

pub async fn list_group_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_role_list(&name).await {
        Ok(roles) => list_response(roles),
        Err(e) => error_response(e),
    }
}

pub async fn add_group_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, role)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["grant"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_role_add(&name, &role).await {
        Ok(()) => Json(serde_json::json!({ "group": name, "role": role })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn remove_group_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, role)): Path<(String, String)>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "group", &["revoke"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.group_role_delete(&name, &role).await {
        Ok(()) => Json(serde_json::json!({ "group": name, "role": role })).into_response(),
        Err(e) => error_response(e),
    }
}
