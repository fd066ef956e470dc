use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use super::kanban;
use super::types::{
    actions, clean_title, FieldChange, Ticket, TicketActivity, TicketChangeset, TicketComment, TicketDraft,
    TicketFilter, TicketFollower, UpdateTicketRequest,
};
use crate::core::error::ApiError;
use crate::core::shared::enums::TicketStage;
use crate::core::shared::schema::{
    ticket_activities, ticket_comments, ticket_followers, tickets, users,
};
use crate::core::shared::utils::like_pattern;
use crate::users::storage as user_storage;
use crate::users::User;

pub fn find_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket, ApiError> {
    tickets::table
        .find(id)
        .select(Ticket::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Ticket"))
}

pub fn list_tickets(conn: &mut PgConnection, filter: &TicketFilter) -> QueryResult<Vec<Ticket>> {
    let mut query = tickets::table.select(Ticket::as_select()).into_boxed();

    if let Some(status) = filter.status {
        query = query.filter(tickets::status.eq(status));
    }
    if let Some(priority) = filter.priority {
        query = query.filter(tickets::priority.eq(priority));
    }
    if let Some(ticket_type) = filter.ticket_type {
        query = query.filter(tickets::ticket_type.eq(ticket_type));
    }
    if let Some(stage) = filter.stage {
        query = query.filter(tickets::stage.eq(stage));
    }
    if let Some(assignee_id) = filter.assignee_id {
        query = query.filter(tickets::assignee_id.eq(assignee_id));
    }
    if let Some(creator_id) = filter.creator_id {
        query = query.filter(tickets::creator_id.eq(creator_id));
    }
    if let Some(ref search) = filter.search {
        let pattern = like_pattern(search);
        query = query.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern)),
        );
    }

    query
        .order(tickets::created_at.desc())
        .limit(filter.limit)
        .offset(filter.offset)
        .load(conn)
}

fn max_position(conn: &mut PgConnection, stage: TicketStage) -> QueryResult<Option<i32>> {
    tickets::table
        .filter(tickets::stage.eq(stage))
        .select(max(tickets::position))
        .first(conn)
}

pub fn record_activity(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    user_id: Option<Uuid>,
    action: &str,
    details: serde_json::Value,
) -> QueryResult<TicketActivity> {
    let activity = TicketActivity {
        id: Uuid::new_v4(),
        ticket_id,
        user_id,
        action: action.to_string(),
        details,
        created_at: Utc::now(),
    };
    diesel::insert_into(ticket_activities::table)
        .values(&activity)
        .execute(conn)?;
    Ok(activity)
}

/// Idempotent: following twice leaves one row.
pub fn follow(conn: &mut PgConnection, ticket_id: Uuid, user_id: Uuid) -> QueryResult<bool> {
    let inserted = diesel::insert_into(ticket_followers::table)
        .values(&TicketFollower {
            id: Uuid::new_v4(),
            ticket_id,
            user_id,
            created_at: Utc::now(),
        })
        .on_conflict((ticket_followers::ticket_id, ticket_followers::user_id))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn unfollow(conn: &mut PgConnection, ticket_id: Uuid, user_id: Uuid) -> QueryResult<usize> {
    diesel::delete(
        ticket_followers::table
            .filter(ticket_followers::ticket_id.eq(ticket_id))
            .filter(ticket_followers::user_id.eq(user_id)),
    )
    .execute(conn)
}

pub fn list_followers(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<Vec<User>> {
    ticket_followers::table
        .inner_join(users::table)
        .filter(ticket_followers::ticket_id.eq(ticket_id))
        .order(ticket_followers::created_at.asc())
        .select(User::as_select())
        .load(conn)
}

pub fn list_comments(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<Vec<TicketComment>> {
    ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .select(TicketComment::as_select())
        .load(conn)
}

pub fn list_activities(
    conn: &mut PgConnection,
    ticket_id: Uuid,
) -> QueryResult<Vec<TicketActivity>> {
    ticket_activities::table
        .filter(ticket_activities::ticket_id.eq(ticket_id))
        .order(ticket_activities::created_at.asc())
        .select(TicketActivity::as_select())
        .load(conn)
}

fn build_ticket(draft: TicketDraft, creator_id: Uuid, position: i32, now: DateTime<Utc>) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        title: draft.title,
        description: draft.description,
        status: draft.status,
        priority: draft.priority,
        ticket_type: draft.ticket_type,
        stage: draft.stage,
        position,
        creator_id: Some(creator_id),
        assignee_id: draft.assignee_id,
        due_date: draft.due_date,
        resolved_at: draft.status.is_terminal().then_some(now),
        created_at: now,
        updated_at: now,
    }
}

fn insert_with_followers(
    conn: &mut PgConnection,
    draft: TicketDraft,
    creator_id: Uuid,
    action: &str,
) -> Result<Ticket, ApiError> {
    let position = kanban::next_position(max_position(conn, draft.stage)?);
    let ticket = build_ticket(draft, creator_id, position, Utc::now());

    diesel::insert_into(tickets::table)
        .values(&ticket)
        .execute(conn)?;

    follow(conn, ticket.id, creator_id)?;
    if let Some(assignee_id) = ticket.assignee_id {
        follow(conn, ticket.id, assignee_id)?;
    }
    record_activity(
        conn,
        ticket.id,
        Some(creator_id),
        action,
        json!({ "title": ticket.title, "stage": ticket.stage }),
    )?;
    Ok(ticket)
}

pub fn create_ticket(
    conn: &mut PgConnection,
    draft: TicketDraft,
    creator_id: Uuid,
) -> Result<Ticket, ApiError> {
    conn.transaction(|conn| insert_with_followers(conn, draft, creator_id, actions::CREATED))
}

/// Inserts every draft or none of them.
pub fn import_tickets(
    conn: &mut PgConnection,
    drafts: Vec<TicketDraft>,
    creator_id: Uuid,
) -> Result<usize, ApiError> {
    conn.transaction(|conn| {
        let count = drafts.len();
        for draft in drafts {
            insert_with_followers(conn, draft, creator_id, actions::IMPORTED)?;
        }
        Ok(count)
    })
}

/// Builds the changeset for `req` against `current` and the activity entries it implies.
///
/// Moving into resolved or closed stamps `resolved_at`; moving back out clears it.
pub fn plan_update(
    current: &Ticket,
    req: UpdateTicketRequest,
    now: DateTime<Utc>,
) -> Result<(TicketChangeset, Vec<FieldChange>), String> {
    let mut changes = TicketChangeset::default();
    let mut log = Vec::new();

    macro_rules! track {
        ($field:ident, $new:expr) => {
            let new = $new;
            if new != current.$field {
                log.push(FieldChange {
                    field: stringify!($field),
                    from: json!(current.$field),
                    to: json!(new),
                });
                changes.$field = Some(new);
            }
        };
    }

    if let Some(title) = req.title {
        let title = clean_title(&title)?;
        track!(title, title);
    }
    if let Some(description) = req.description {
        track!(description, description.filter(|d| !d.trim().is_empty()));
    }
    if let Some(status) = req.status {
        track!(status, status);
        if status.is_terminal() && !current.status.is_terminal() {
            changes.resolved_at = Some(Some(now));
        } else if !status.is_terminal() && current.status.is_terminal() {
            changes.resolved_at = Some(None);
        }
    }
    if let Some(priority) = req.priority {
        track!(priority, priority);
    }
    if let Some(ticket_type) = req.ticket_type {
        track!(ticket_type, ticket_type);
    }
    if let Some(stage) = req.stage {
        track!(stage, stage);
    }
    if let Some(assignee_id) = req.assignee_id {
        track!(assignee_id, assignee_id);
    }
    if let Some(due_date) = req.due_date {
        track!(due_date, due_date);
    }

    if !log.is_empty() {
        changes.updated_at = Some(now);
    }
    Ok((changes, log))
}

pub fn update_ticket(
    conn: &mut PgConnection,
    id: Uuid,
    actor_id: Uuid,
    req: UpdateTicketRequest,
) -> Result<Ticket, ApiError> {
    conn.transaction(|conn| {
        let current = find_ticket(conn, id)?;
        let (mut changes, log) =
            plan_update(&current, req, Utc::now()).map_err(ApiError::BadRequest)?;
        if log.is_empty() {
            return Ok(current);
        }

        if let Some(stage) = changes.stage {
            changes.position = Some(kanban::next_position(max_position(conn, stage)?));
        }

        let updated = diesel::update(tickets::table.find(id))
            .set(&changes)
            .returning(Ticket::as_returning())
            .get_result(conn)?;

        for change in &log {
            record_activity(conn, id, Some(actor_id), actions::UPDATED, json!(change))?;
        }
        if let Some(Some(assignee_id)) = changes.assignee_id {
            follow(conn, id, assignee_id)?;
        }
        Ok(updated)
    })
}

pub fn delete_ticket(conn: &mut PgConnection, id: Uuid) -> QueryResult<usize> {
    diesel::delete(tickets::table.find(id)).execute(conn)
}

/// Comment, `commented` activity, author follow, then mention follows.
pub fn add_comment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    author_id: Uuid,
    content: String,
    mentions: &[String],
) -> Result<TicketComment, ApiError> {
    conn.transaction(|conn| {
        find_ticket(conn, ticket_id)?;

        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id,
            user_id: author_id,
            content,
            created_at: Utc::now(),
        };
        diesel::insert_into(ticket_comments::table)
            .values(&comment)
            .execute(conn)?;

        let mut mentioned = Vec::new();
        follow(conn, ticket_id, author_id)?;
        for handle in mentions {
            if let Some(user) = user_storage::find_by_email_fragment(conn, handle)? {
                follow(conn, ticket_id, user.id)?;
                mentioned.push(user.id);
            }
        }

        record_activity(
            conn,
            ticket_id,
            Some(author_id),
            actions::COMMENTED,
            json!({ "comment_id": comment.id, "mentioned": mentioned }),
        )?;
        Ok(comment)
    })
}

pub fn find_comment(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    comment_id: Uuid,
) -> Result<TicketComment, ApiError> {
    ticket_comments::table
        .filter(ticket_comments::id.eq(comment_id))
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .select(TicketComment::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

pub fn delete_comment(conn: &mut PgConnection, comment_id: Uuid) -> QueryResult<usize> {
    diesel::delete(ticket_comments::table.find(comment_id)).execute(conn)
}

pub fn load_board(conn: &mut PgConnection) -> QueryResult<Vec<Ticket>> {
    tickets::table
        .order((
            tickets::stage.asc(),
            tickets::position.asc(),
            tickets::created_at.asc(),
        ))
        .select(Ticket::as_select())
        .load(conn)
}

/// Appends the ticket to `stage`. Same-stage moves leave it untouched.
pub fn move_to_stage(
    conn: &mut PgConnection,
    id: Uuid,
    stage: TicketStage,
    actor_id: Uuid,
) -> Result<Ticket, ApiError> {
    conn.transaction(|conn| {
        let current = find_ticket(conn, id)?;
        if current.stage == stage {
            return Ok(current);
        }

        let position = kanban::next_position(max_position(conn, stage)?);
        let updated = diesel::update(tickets::table.find(id))
            .set((
                tickets::stage.eq(stage),
                tickets::position.eq(position),
                tickets::updated_at.eq(Utc::now()),
            ))
            .returning(Ticket::as_returning())
            .get_result(conn)?;

        record_activity(
            conn,
            id,
            Some(actor_id),
            actions::STAGE_CHANGED,
            json!({ "from": current.stage, "to": stage, "position": position }),
        )?;
        Ok(updated)
    })
}

/// Rewrites positions of `ids` as `0..n`. `ids` must be exactly the cards in `stage`.
pub fn reorder_stage(
    conn: &mut PgConnection,
    stage: TicketStage,
    ids: &[Uuid],
) -> Result<Vec<Ticket>, ApiError> {
    kanban::validate_reorder(ids).map_err(ApiError::BadRequest)?;

    conn.transaction(|conn| {
        let matched: i64 = tickets::table
            .filter(tickets::id.eq_any(ids))
            .filter(tickets::stage.eq(stage))
            .count()
            .get_result(conn)?;
        let stage_total: i64 = tickets::table
            .filter(tickets::stage.eq(stage))
            .count()
            .get_result(conn)?;
        kanban::check_reorder_coverage(ids.len(), matched, stage_total, stage)
            .map_err(ApiError::BadRequest)?;

        let now = Utc::now();
        for (id, position) in kanban::assign_positions(ids) {
            diesel::update(tickets::table.find(id))
                .set((tickets::position.eq(position), tickets::updated_at.eq(now)))
                .execute(conn)?;
        }

        Ok(tickets::table
            .filter(tickets::stage.eq(stage))
            .order((tickets::position.asc(), tickets::created_at.asc()))
            .select(Ticket::as_select())
            .load(conn)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::{TicketPriority, TicketStatus};

    fn ticket(status: TicketStatus) -> Ticket {
        build_ticket(
            TicketDraft {
                title: "VPN down".into(),
                status,
                ..TicketDraft::default()
            },
            Uuid::new_v4(),
            0,
            Utc::now(),
        )
    }

    #[test]
    fn test_new_terminal_ticket_is_stamped() {
        assert!(ticket(TicketStatus::Open).resolved_at.is_none());
        assert!(ticket(TicketStatus::Closed).resolved_at.is_some());
    }

    #[test]
    fn test_resolving_stamps_resolved_at() {
        let current = ticket(TicketStatus::InProgress);
        let now = Utc::now();
        let req = UpdateTicketRequest {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        let (changes, log) = plan_update(&current, req, now).unwrap();
        assert_eq!(changes.resolved_at, Some(Some(now)));
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].field, "status");
        assert_eq!(log[0].from, json!("in_progress"));
        assert_eq!(log[0].to, json!("resolved"));
    }

    #[test]
    fn test_reopening_clears_resolved_at() {
        let current = ticket(TicketStatus::Resolved);
        let req = UpdateTicketRequest {
            status: Some(TicketStatus::Open),
            ..Default::default()
        };
        let (changes, _) = plan_update(&current, req, Utc::now()).unwrap();
        assert_eq!(changes.resolved_at, Some(None));
    }

    #[test]
    fn test_resolved_to_closed_keeps_stamp() {
        let current = ticket(TicketStatus::Resolved);
        let req = UpdateTicketRequest {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };
        let (changes, _) = plan_update(&current, req, Utc::now()).unwrap();
        assert_eq!(changes.resolved_at, None);
        assert_eq!(changes.status, Some(TicketStatus::Closed));
    }

    #[test]
    fn test_unchanged_fields_are_not_logged() {
        let current = ticket(TicketStatus::Open);
        let assignee = Uuid::new_v4();
        let req = UpdateTicketRequest {
            title: Some(current.title.clone()),
            priority: Some(TicketPriority::High),
            assignee_id: Some(Some(assignee)),
            ..Default::default()
        };
        let (changes, log) = plan_update(&current, req, Utc::now()).unwrap();
        let fields: Vec<&str> = log.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["priority", "assignee_id"]);
        assert!(changes.title.is_none());
        assert_eq!(changes.assignee_id, Some(Some(assignee)));
        assert!(changes.updated_at.is_some());
    }

    #[test]
    fn test_empty_update_is_noop() {
        let current = ticket(TicketStatus::Open);
        let (changes, log) = plan_update(&current, UpdateTicketRequest::default(), Utc::now()).unwrap();
        assert!(log.is_empty());
        assert!(changes.updated_at.is_none());
    }

    #[test]
    fn test_blank_title_rejected() {
        let current = ticket(TicketStatus::Open);
        let req = UpdateTicketRequest {
            title: Some("  ".into()),
            ..Default::default()
        };
        assert!(plan_update(&current, req, Utc::now()).is_err());
    }

    #[test]
    fn test_overlong_title_rejected() {
        let current = ticket(TicketStatus::Open);
        let req = UpdateTicketRequest {
            title: Some("x".repeat(501)),
            ..Default::default()
        };
        let err = plan_update(&current, req, Utc::now()).unwrap_err();
        assert!(err.contains("too long"));
    }
}
