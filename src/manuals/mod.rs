use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::schema::manuals;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{check_length, deserialize_some, like_pattern, run_blocking};
use crate::core::urls::ApiUrls;
use crate::security::auth::{AdminUser, AuthenticatedUser};

const TITLE_MAX_CHARS: usize = 255;
const CATEGORY_MAX_CHARS: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = manuals)]
pub struct Manual {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateManualRequest {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = manuals)]
pub struct UpdateManualRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub category: Option<Option<String>>,
}

impl UpdateManualRequest {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.category.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListManualsQuery {
    pub search: Option<String>,
    pub category: Option<String>,
}

fn find_manual(conn: &mut PgConnection, id: Uuid) -> Result<Manual, ApiError> {
    manuals::table
        .find(id)
        .select(Manual::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Manual"))
}

fn clean_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

pub async fn list_manuals(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListManualsQuery>,
) -> Result<Json<Vec<Manual>>, ApiError> {
    let items = run_blocking(&state.conn, move |conn| {
        let mut q = manuals::table.select(Manual::as_select()).into_boxed();
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            q = q.filter(manuals::title.ilike(like_pattern(search)));
        }
        if let Some(category) = clean_category(query.category) {
            q = q.filter(manuals::category.eq(category));
        }
        Ok(q.order(manuals::title.asc()).load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_manual(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Manual>, ApiError> {
    let manual = run_blocking(&state.conn, move |conn| find_manual(conn, id)).await?;
    Ok(Json(manual))
}

pub async fn create_manual(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Json(req): Json<CreateManualRequest>,
) -> Result<(StatusCode, Json<Manual>), ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() || req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("title and content are required".into()));
    }
    check_length("title", &title, TITLE_MAX_CHARS)?;
    let category = clean_category(req.category);
    if let Some(category) = &category {
        check_length("category", category, CATEGORY_MAX_CHARS)?;
    }
    let now = Utc::now();
    let manual = Manual {
        id: Uuid::new_v4(),
        title,
        content: req.content,
        category,
        author_id: admin.user_id,
        created_at: now,
        updated_at: now,
    };
    let created = run_blocking(&state.conn, move |conn| {
        Ok(diesel::insert_into(manuals::table)
            .values(&manual)
            .returning(Manual::as_returning())
            .get_result(conn)?)
    })
    .await?;
    info!("Manual {} created by {}", created.id, admin.user_id);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_manual(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateManualRequest>,
) -> Result<Json<Manual>, ApiError> {
    if let Some(title) = req.title.as_mut() {
        *title = title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::BadRequest("title cannot be empty".into()));
        }
        check_length("title", title, TITLE_MAX_CHARS)?;
    }
    if req.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ApiError::BadRequest("content cannot be empty".into()));
    }
    req.category = req.category.map(clean_category);
    if let Some(Some(category)) = &req.category {
        check_length("category", category, CATEGORY_MAX_CHARS)?;
    }

    let manual = run_blocking(&state.conn, move |conn| {
        let current = find_manual(conn, id)?;
        if req.is_empty() {
            return Ok(current);
        }
        Ok(diesel::update(manuals::table.find(id))
            .set((&req, manuals::updated_at.eq(Utc::now())))
            .returning(Manual::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(manual))
}

pub async fn delete_manual(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = run_blocking(&state.conn, move |conn| {
        Ok(diesel::delete(manuals::table.find(id)).execute(conn)?)
    })
    .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Manual"));
    }
    info!("Manual {id} deleted by {}", admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_manuals_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::MANUALS, get(list_manuals).post(create_manual))
        .route(
            ApiUrls::MANUAL_BY_ID,
            get(get_manual).put(update_manual).delete(delete_manual),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_category_is_none() {
        assert_eq!(clean_category(Some("  ".into())), None);
        assert_eq!(clean_category(Some(" Network ".into())), Some("Network".into()));
        assert_eq!(clean_category(None), None);
    }

    #[test]
    fn test_update_distinguishes_null_category() {
        let req: UpdateManualRequest = serde_json::from_str(r#"{"category": null}"#).unwrap();
        assert_eq!(req.category, Some(None));
        assert!(!req.is_empty());

        let req: UpdateManualRequest = serde_json::from_str("{}").unwrap();
        assert!(req.is_empty());
    }
}
