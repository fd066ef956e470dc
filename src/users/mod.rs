pub mod storage;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::enums::UserRole;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{check_length, clamp_limit, run_blocking};
use crate::core::urls::ApiUrls;
use crate::security::auth::{AdminUser, AuthenticatedUser};

pub use storage::User;
use storage::UserChanges;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let limit = clamp_limit(query.limit, 100, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let users = run_blocking(&state.conn, move |conn| {
        Ok(storage::list_users(conn, query.search.as_deref(), limit, offset)?)
    })
    .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = run_blocking(&state.conn, move |conn| {
        storage::find_user(conn, id).map_err(|_| ApiError::not_found("User"))
    })
    .await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    caller: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    if !caller.can_access(id) {
        return Err(ApiError::permission_denied());
    }

    let name = match req.name {
        Some(name) if name.trim().is_empty() => {
            return Err(ApiError::BadRequest("name cannot be empty".into()))
        }
        other => other.map(|n| n.trim().to_string()),
    };
    if let Some(name) = &name {
        check_length("name", name, storage::NAME_MAX_CHARS)?;
    }
    let changes = UserChanges {
        name,
        avatar_url: req.avatar_url,
    };

    let user = run_blocking(&state.conn, move |conn| {
        storage::find_user(conn, id).map_err(|_| ApiError::not_found("User"))?;
        Ok(storage::update_profile(conn, id, &changes)?)
    })
    .await?;
    Ok(Json(user))
}

pub async fn update_role(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let user = run_blocking(&state.conn, move |conn| {
        storage::find_user(conn, id).map_err(|_| ApiError::not_found("User"))?;
        Ok(storage::set_role(conn, id, req.role)?)
    })
    .await?;
    info!("User {} set role of {} to {}", admin.user_id, id, req.role);
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.user_id == id {
        return Err(ApiError::BadRequest("You cannot delete your own account".into()));
    }
    let deleted = run_blocking(&state.conn, move |conn| Ok(storage::delete_user(conn, id)?)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("User"));
    }
    info!("User {id} deleted by {}", admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::USERS, get(list_users))
        .route(
            ApiUrls::USER_BY_ID,
            get(get_user).put(update_user).delete(delete_user),
        )
        .route(ApiUrls::USER_ROLE, put(update_role))
}
