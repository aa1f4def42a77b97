//! User management endpoints.
//!
//! - `GET    /v2/users`               — list (204 when empty)
//! - `GET    /v2/users/:name`         — single user
//! - `PUT    /v2/users/:name`         — create or update
//! - `DELETE /v2/users/:name`         — delete (admin is undeletable)
//! - `GET    /v2/users/:name/groups`  — the user's groups

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use gort_data::DataAccess;
use gort_domain::{Error, User};
use serde::Deserialize;

use super::{auth::authorize, error_response, list_response};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

pub async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers, "user", &["list"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.user_list().await {
        Ok(users) => list_response(users),
        Err(e) => error_response(e),
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "user", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.user_get(&name).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn put_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(spec): Json<UserSpec>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "user", &["create"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };

    let password_hash = if spec.password.is_empty() {
        String::new()
    } else {
        match gort_auth::hash_password(&spec.password) {
            Ok(hash) => hash,
            Err(e) => return error_response(e),
        }
    };
    let user = User {
        username: name.clone(),
        email: spec.email,
        full_name: spec.full_name,
        password_hash,
        mappings: spec.mappings,
    };

    // PUT is create-or-update.
    let result = match da.user_exists(&name).await {
        Ok(true) => da.user_update(&user).await,
        Ok(false) => {
            if user.password_hash.is_empty() {
                Err(Error::EmptyValue("password"))
            } else {
                da.user_create(&user).await
            }
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Json(user).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "user", &["delete"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.user_delete(&name).await {
        Ok(()) => Json(serde_json::json!({ "deleted": name })).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn user_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = authorize(&state, &headers, "user", &["info"]).await {
        return error_response(e);
    }
    let da = match state.data.get().await {
        Ok(da) => da,
        Err(e) => return error_response(e),
    };
    match da.user_group_list(&name).await {
        Ok(groups) => list_response(groups),
        Err(e) => error_response(e),
    }
}
