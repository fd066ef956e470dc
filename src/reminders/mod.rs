//! Personal reminders. Every query is scoped to the caller, so another
//! user's reminder looks exactly like a missing one.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::schema::reminders;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{check_length, deserialize_some, run_blocking};
use crate::core::urls::ApiUrls;
use crate::security::auth::AuthenticatedUser;

const TITLE_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = reminders)]
pub struct Reminder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub is_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    pub title: String,
    pub description: Option<String>,
    pub remind_at: DateTime<Utc>,
    pub ticket_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = reminders)]
pub struct UpdateReminderRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub remind_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub ticket_id: Option<Option<Uuid>>,
    pub is_done: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRemindersQuery {
    pub pending: Option<bool>,
}

fn owned(conn: &mut PgConnection, id: Uuid, user_id: Uuid) -> Result<Reminder, ApiError> {
    reminders::table
        .filter(reminders::id.eq(id))
        .filter(reminders::user_id.eq(user_id))
        .select(Reminder::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Reminder"))
}

pub async fn list_reminders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListRemindersQuery>,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let user_id = user.user_id;
    let items = run_blocking(&state.conn, move |conn| {
        let mut q = reminders::table
            .filter(reminders::user_id.eq(user_id))
            .select(Reminder::as_select())
            .into_boxed();
        if query.pending == Some(true) {
            q = q.filter(reminders::is_done.eq(false));
        }
        Ok(q.order(reminders::remind_at.asc()).load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

/// Undone reminders whose time has come.
pub async fn list_due(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Reminder>>, ApiError> {
    let user_id = user.user_id;
    let items = run_blocking(&state.conn, move |conn| {
        Ok(reminders::table
            .filter(reminders::user_id.eq(user_id))
            .filter(reminders::is_done.eq(false))
            .filter(reminders::remind_at.le(Utc::now()))
            .order(reminders::remind_at.asc())
            .select(Reminder::as_select())
            .load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn create_reminder(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<Reminder>), ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    check_length("title", &title, TITLE_MAX_CHARS)?;
    let now = Utc::now();
    let reminder = Reminder {
        id: Uuid::new_v4(),
        user_id: user.user_id,
        ticket_id: req.ticket_id,
        title,
        description: req.description,
        remind_at: req.remind_at,
        is_done: false,
        created_at: now,
        updated_at: now,
    };
    let created = run_blocking(&state.conn, move |conn| {
        Ok(diesel::insert_into(reminders::table)
            .values(&reminder)
            .returning(Reminder::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_reminder(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reminder>, ApiError> {
    let user_id = user.user_id;
    let reminder = run_blocking(&state.conn, move |conn| owned(conn, id, user_id)).await?;
    Ok(Json(reminder))
}

pub async fn update_reminder(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateReminderRequest>,
) -> Result<Json<Reminder>, ApiError> {
    if let Some(title) = req.title.as_mut() {
        *title = title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::BadRequest("title cannot be empty".into()));
        }
        check_length("title", title, TITLE_MAX_CHARS)?;
    }
    let user_id = user.user_id;
    let reminder = run_blocking(&state.conn, move |conn| {
        let current = owned(conn, id, user_id)?;
        if req.title.is_none()
            && req.description.is_none()
            && req.remind_at.is_none()
            && req.ticket_id.is_none()
            && req.is_done.is_none()
        {
            return Ok(current);
        }
        Ok(diesel::update(reminders::table.find(id))
            .set((&req, reminders::updated_at.eq(Utc::now())))
            .returning(Reminder::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(reminder))
}

pub async fn toggle_done(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Reminder>, ApiError> {
    let user_id = user.user_id;
    let reminder = run_blocking(&state.conn, move |conn| {
        let current = owned(conn, id, user_id)?;
        Ok(diesel::update(reminders::table.find(id))
            .set((
                reminders::is_done.eq(!current.is_done),
                reminders::updated_at.eq(Utc::now()),
            ))
            .returning(Reminder::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(reminder))
}

pub async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id;
    let deleted = run_blocking(&state.conn, move |conn| {
        Ok(diesel::delete(
            reminders::table
                .filter(reminders::id.eq(id))
                .filter(reminders::user_id.eq(user_id)),
        )
        .execute(conn)?)
    })
    .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Reminder"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_reminders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::REMINDERS, get(list_reminders).post(create_reminder))
        .route(ApiUrls::REMINDERS_DUE, get(list_due))
        .route(
            ApiUrls::REMINDER_BY_ID,
            get(get_reminder).put(update_reminder).delete(delete_reminder),
        )
        .route(ApiUrls::REMINDER_DONE, put(toggle_done))
}
