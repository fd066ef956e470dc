use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::enums::{TicketPriority, TicketStage, TicketStatus, TicketType};
use crate::core::shared::schema::{ticket_activities, ticket_comments, ticket_followers, tickets};
use crate::core::shared::utils::deserialize_some;
use crate::users::User;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = tickets)]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(rename = "type", alias = "ticket_type")]
    pub ticket_type: TicketType,
    pub stage: TicketStage,
    pub position: i32,
    pub creator_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = ticket_comments)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = ticket_activities)]
pub struct TicketActivity {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = ticket_followers)]
pub struct TicketFollower {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub mod actions {
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";
    pub const COMMENTED: &str = "commented";
    pub const STAGE_CHANGED: &str = "stage_changed";
    pub const DOCUMENT_ATTACHED: &str = "document_attached";
    pub const IMPORTED: &str = "imported";
}

/// Validated input for a new ticket, shared by the JSON and spreadsheet paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketDraft {
    pub title: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub ticket_type: TicketType,
    pub stage: TicketStage,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

/// `tickets.title` is `VARCHAR(500)`.
pub const TITLE_MAX_CHARS: usize = 500;

/// Trims and validates a ticket title.
pub fn clean_title(title: &str) -> Result<String, String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("title is required".into());
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(format!("title is too long (max {TITLE_MAX_CHARS} characters)"));
    }
    Ok(title.to_string())
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[serde(rename = "type", alias = "ticket_type")]
    pub ticket_type: Option<TicketType>,
    pub stage: Option<TicketStage>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<DateTime<Utc>>,
}

impl CreateTicketRequest {
    pub fn into_draft(self) -> Result<TicketDraft, String> {
        let title = clean_title(&self.title)?;
        Ok(TicketDraft {
            title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            ticket_type: self.ticket_type.unwrap_or_default(),
            stage: self.stage.unwrap_or_default(),
            assignee_id: self.assignee_id,
            due_date: self.due_date,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    #[serde(rename = "type", alias = "ticket_type")]
    pub ticket_type: Option<TicketType>,
    pub stage: Option<TicketStage>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct TicketChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub ticket_type: Option<TicketType>,
    pub stage: Option<TicketStage>,
    pub position: Option<i32>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub resolved_at: Option<Option<DateTime<Utc>>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    #[serde(rename = "type", alias = "ticket_type")]
    pub ticket_type: Option<String>,
    pub stage: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Parsed list filters.
#[derive(Debug, Default, Clone)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub ticket_type: Option<TicketType>,
    pub stage: Option<TicketStage>,
    pub assignee_id: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub comments: Vec<TicketComment>,
    pub activities: Vec<TicketActivity>,
    pub followers: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveStageRequest {
    pub stage: TicketStage,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub stage: TicketStage,
    pub ticket_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Serialize)]
pub struct KanbanBoard {
    pub backlog: Vec<Ticket>,
    pub dev: Vec<Ticket>,
    pub homolog: Vec<Ticket>,
    pub prod: Vec<Ticket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportRowError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req: CreateTicketRequest =
            serde_json::from_str(r#"{"title": "  Printer jam  "}"#).unwrap();
        let draft = req.into_draft().unwrap();
        assert_eq!(draft.title, "Printer jam");
        assert_eq!(draft.status, TicketStatus::Open);
        assert_eq!(draft.priority, TicketPriority::Medium);
        assert_eq!(draft.ticket_type, TicketType::Support);
        assert_eq!(draft.stage, TicketStage::Backlog);
    }

    #[test]
    fn test_create_request_accepts_type_alias() {
        let req: CreateTicketRequest =
            serde_json::from_str(r#"{"title": "Crash", "type": "bug", "priority": "critical"}"#)
                .unwrap();
        let draft = req.into_draft().unwrap();
        assert_eq!(draft.ticket_type, TicketType::Bug);
        assert_eq!(draft.priority, TicketPriority::Critical);
    }

    #[test]
    fn test_ticket_type_uses_one_wire_name() {
        let req: CreateTicketRequest =
            serde_json::from_str(r#"{"title": "Crash", "ticket_type": "incident"}"#).unwrap();
        let draft = req.into_draft().unwrap();
        assert_eq!(draft.ticket_type, TicketType::Incident);

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: draft.title,
            description: None,
            status: draft.status,
            priority: draft.priority,
            ticket_type: draft.ticket_type,
            stage: draft.stage,
            position: 0,
            creator_id: None,
            assignee_id: None,
            due_date: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["type"], "incident");
        assert!(json.get("ticket_type").is_none());
        assert!(json["creator_id"].is_null());

        let echoed: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(echoed.ticket_type, TicketType::Incident);
    }

    #[test]
    fn test_blank_title_rejected() {
        let req: CreateTicketRequest = serde_json::from_str(r#"{"title": "   "}"#).unwrap();
        assert!(req.into_draft().is_err());
    }

    #[test]
    fn test_title_length_limit() {
        assert!(clean_title(&"t".repeat(TITLE_MAX_CHARS)).is_ok());
        let body = serde_json::json!({ "title": "t".repeat(600) });
        let req: CreateTicketRequest = serde_json::from_value(body).unwrap();
        assert!(req.into_draft().unwrap_err().contains("too long"));
    }

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let req: UpdateTicketRequest = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(req.assignee_id, Some(None));
        assert_eq!(req.due_date, None);

        let req: UpdateTicketRequest = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(req.assignee_id, None);
    }
}
