use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use log::info;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::import::{self, ImportRecord};
use super::kanban;
use super::mentions::extract_mentions;
use super::storage;
use super::types::{
    CreateCommentRequest, CreateTicketRequest, ImportReport, KanbanBoard, ListTicketsQuery,
    MoveStageRequest, ReorderRequest, Ticket, TicketActivity, TicketComment, TicketDetail,
    TicketFilter, UpdateTicketRequest,
};
use crate::core::error::ApiError;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{clamp_limit, run_blocking};
use crate::security::auth::AuthenticatedUser;
use crate::users::storage as user_storage;
use crate::users::User;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

fn parse_filter<T: FromStr<Err = String>>(value: Option<String>) -> Result<Option<T>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<T>().map_err(ApiError::BadRequest))
        .transpose()
}

impl TryFrom<ListTicketsQuery> for TicketFilter {
    type Error = ApiError;

    fn try_from(query: ListTicketsQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            status: parse_filter(query.status)?,
            priority: parse_filter(query.priority)?,
            ticket_type: parse_filter(query.ticket_type)?,
            stage: parse_filter(query.stage)?,
            assignee_id: query.assignee_id,
            creator_id: query.creator_id,
            search: query.search.filter(|s| !s.trim().is_empty()),
            limit: clamp_limit(query.limit, DEFAULT_LIMIT, MAX_LIMIT),
            offset: query.offset.unwrap_or(0).max(0),
        })
    }
}

fn can_edit(user: &AuthenticatedUser, ticket: &Ticket) -> bool {
    user.is_admin() || ticket.creator_id == Some(user.user_id) || ticket.assignee_id == Some(user.user_id)
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let filter = TicketFilter::try_from(query)?;
    let tickets =
        run_blocking(&state.conn, move |conn| Ok(storage::list_tickets(conn, &filter)?)).await?;
    Ok(Json(tickets))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let draft = req.into_draft().map_err(ApiError::BadRequest)?;
    let creator_id = user.user_id;
    let ticket = run_blocking(&state.conn, move |conn| {
        storage::create_ticket(conn, draft, creator_id)
    })
    .await?;
    info!("Ticket {} created by {}", ticket.id, creator_id);
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetail>, ApiError> {
    let detail = run_blocking(&state.conn, move |conn| {
        let ticket = storage::find_ticket(conn, id)?;
        Ok(TicketDetail {
            comments: storage::list_comments(conn, id)?,
            activities: storage::list_activities(conn, id)?,
            followers: storage::list_followers(conn, id)?,
            ticket,
        })
    })
    .await?;
    Ok(Json(detail))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = run_blocking(&state.conn, move |conn| {
        let current = storage::find_ticket(conn, id)?;
        if !can_edit(&user, &current) {
            return Err(ApiError::permission_denied());
        }
        storage::update_ticket(conn, id, user.user_id, req)
    })
    .await?;
    Ok(Json(ticket))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id;
    run_blocking(&state.conn, move |conn| {
        let current = storage::find_ticket(conn, id)?;
        if !user.can_access(current.creator_id) {
            return Err(ApiError::permission_denied());
        }
        storage::delete_ticket(conn, id)?;
        Ok(())
    })
    .await?;
    info!("Ticket {id} deleted by {user_id}");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<TicketComment>), ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content is required".into()));
    }
    let mentions = extract_mentions(&content);
    let author_id = user.user_id;
    let comment = run_blocking(&state.conn, move |conn| {
        storage::add_comment(conn, id, author_id, content, &mentions)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketComment>>, ApiError> {
    let comments = run_blocking(&state.conn, move |conn| {
        storage::find_ticket(conn, id)?;
        Ok(storage::list_comments(conn, id)?)
    })
    .await?;
    Ok(Json(comments))
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((id, comment_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state.conn, move |conn| {
        let comment = storage::find_comment(conn, id, comment_id)?;
        if !user.can_access(comment.user_id) {
            return Err(ApiError::permission_denied());
        }
        storage::delete_comment(conn, comment_id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn follow_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id;
    run_blocking(&state.conn, move |conn| {
        storage::find_ticket(conn, id)?;
        storage::follow(conn, id, user_id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.user_id;
    run_blocking(&state.conn, move |conn| {
        storage::find_ticket(conn, id)?;
        storage::unfollow(conn, id, user_id)?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_followers(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<User>>, ApiError> {
    let followers = run_blocking(&state.conn, move |conn| {
        storage::find_ticket(conn, id)?;
        Ok(storage::list_followers(conn, id)?)
    })
    .await?;
    Ok(Json(followers))
}

pub async fn list_activities(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketActivity>>, ApiError> {
    let activities = run_blocking(&state.conn, move |conn| {
        storage::find_ticket(conn, id)?;
        Ok(storage::list_activities(conn, id)?)
    })
    .await?;
    Ok(Json(activities))
}

pub async fn kanban_board(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Result<Json<KanbanBoard>, ApiError> {
    let tickets = run_blocking(&state.conn, |conn| Ok(storage::load_board(conn)?)).await?;
    Ok(Json(kanban::group_by_stage(tickets)))
}

pub async fn move_stage(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveStageRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let actor_id = user.user_id;
    let ticket = run_blocking(&state.conn, move |conn| {
        storage::move_to_stage(conn, id, req.stage, actor_id)
    })
    .await?;
    Ok(Json(ticket))
}

pub async fn reorder(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    kanban::validate_reorder(&req.ticket_ids).map_err(ApiError::BadRequest)?;
    let column = run_blocking(&state.conn, move |conn| {
        storage::reorder_stage(conn, req.stage, &req.ticket_ids)
    })
    .await?;
    Ok(Json(column))
}

async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.xlsx").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
        return Ok((file_name, data.to_vec()));
    }
    Err(ApiError::BadRequest("Missing multipart field 'file'".into()))
}

pub async fn import_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    let (file_name, data) = read_upload(multipart).await?;
    if !file_name.to_lowercase().ends_with(".xlsx") {
        return Err(ApiError::BadRequest("Only .xlsx files can be imported".into()));
    }

    let creator_id = user.user_id;
    let report = run_blocking(&state.conn, move |conn| {
        let rows = import::read_sheet(&data).map_err(ApiError::BadRequest)?;
        let records = import::rows_to_records(rows).map_err(ApiError::BadRequest)?;
        let records: Vec<ImportRecord> = records.into_iter().filter(|r| !r.is_blank()).collect();

        let mut assignees = HashMap::new();
        for email in records.iter().filter_map(ImportRecord::assignee_email) {
            if assignees.contains_key(&email) {
                continue;
            }
            if let Some(found) = user_storage::find_by_email(conn, &email)? {
                assignees.insert(email, found.id);
            }
        }

        let mut report = ImportReport::default();
        let mut drafts = Vec::new();
        for record in &records {
            match import::record_to_draft(record, &assignees) {
                Ok(draft) => drafts.push(draft),
                Err(error) => {
                    report.skipped += 1;
                    report.errors.push(error);
                }
            }
        }
        report.imported = storage::import_tickets(conn, drafts, creator_id)?;
        Ok(report)
    })
    .await?;

    info!(
        "Imported {} tickets from {file_name} ({} skipped)",
        report.imported, report.skipped
    );
    Ok(Json(report))
}
