//! Saved workflow diagrams. The server stores and validates them; it never runs them.

pub mod graph;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::ApiError;
use crate::core::shared::schema::workflows;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{check_length, deserialize_some, run_blocking};
use crate::core::urls::ApiUrls;
use crate::security::auth::AuthenticatedUser;

const NAME_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = workflows)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub graph: serde_json::Value,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "empty_graph")]
    pub graph: serde_json::Value,
}

fn empty_graph() -> serde_json::Value {
    serde_json::json!({ "nodes": [], "edges": [] })
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = workflows)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub graph: Option<serde_json::Value>,
}

fn check_graph(graph: &serde_json::Value) -> Result<(), ApiError> {
    graph::validate_graph(graph).map_err(|e| ApiError::BadRequest(format!("Invalid graph: {e}")))
}

/// Loads a workflow the caller may see; others' workflows read as missing.
fn visible(
    conn: &mut PgConnection,
    id: Uuid,
    user: &AuthenticatedUser,
) -> Result<Workflow, ApiError> {
    workflows::table
        .find(id)
        .select(Workflow::as_select())
        .first(conn)
        .optional()?
        .filter(|w| user.can_access(w.owner_id))
        .ok_or_else(|| ApiError::not_found("Workflow"))
}

pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    let items = run_blocking(&state.conn, move |conn| {
        let mut q = workflows::table.select(Workflow::as_select()).into_boxed();
        if !user.is_admin() {
            q = q.filter(workflows::owner_id.eq(user.user_id));
        }
        Ok(q.order(workflows::updated_at.desc()).load(conn)?)
    })
    .await?;
    Ok(Json(items))
}

pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Workflow>, ApiError> {
    let workflow = run_blocking(&state.conn, move |conn| visible(conn, id, &user)).await?;
    Ok(Json(workflow))
}

pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }
    check_length("name", &name, NAME_MAX_CHARS)?;
    check_graph(&req.graph)?;

    let now = Utc::now();
    let workflow = Workflow {
        id: Uuid::new_v4(),
        name,
        description: req.description,
        graph: req.graph,
        owner_id: user.user_id,
        created_at: now,
        updated_at: now,
    };
    let created = run_blocking(&state.conn, move |conn| {
        Ok(diesel::insert_into(workflows::table)
            .values(&workflow)
            .returning(Workflow::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    if let Some(name) = req.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::BadRequest("name cannot be empty".into()));
        }
        check_length("name", name, NAME_MAX_CHARS)?;
    }
    if let Some(graph) = &req.graph {
        check_graph(graph)?;
    }

    let workflow = run_blocking(&state.conn, move |conn| {
        let current = visible(conn, id, &user)?;
        if req.name.is_none() && req.description.is_none() && req.graph.is_none() {
            return Ok(current);
        }
        Ok(diesel::update(workflows::table.find(id))
            .set((&req, workflows::updated_at.eq(Utc::now())))
            .returning(Workflow::as_returning())
            .get_result(conn)?)
    })
    .await?;
    Ok(Json(workflow))
}

pub async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state.conn, move |conn| {
        visible(conn, id, &user)?;
        diesel::delete(workflows::table.find(id)).execute(conn)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_workflows_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::WORKFLOWS, get(list_workflows).post(create_workflow))
        .route(
            ApiUrls::WORKFLOW_BY_ID,
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
}
