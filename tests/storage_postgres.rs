//! Storage and route checks against a real Postgres.
//!
//! Set `TEST_DATABASE_URL` to a throwaway database to run them; without it every
//! test returns early. The tests share one pool and take a lock, because
//! reordering reads whole Kanban columns.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use diesel::prelude::*;
use http_body_util::BodyExt;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tower::ServiceExt;
use uuid::Uuid;

use ticketdesk::core::config::AppConfig;
use ticketdesk::core::error::ApiError;
use ticketdesk::core::shared::enums::{TicketStage, UserRole};
use ticketdesk::core::shared::schema::{documents, tickets};
use ticketdesk::core::shared::state::AppState;
use ticketdesk::core::shared::utils::{create_pool, run_migrations, DbPool};
use ticketdesk::documents::Document;
use ticketdesk::main_module::build_router;
use ticketdesk::reports::period::{PeriodKey, PeriodKind};
use ticketdesk::reports::storage as report_storage;
use ticketdesk::security::jwt::TokenSubject;
use ticketdesk::security::password::{Argon2Config, PasswordPolicy, PasswordService};
use ticketdesk::tickets::storage as ticket_storage;
use ticketdesk::tickets::types::TicketDraft;
use ticketdesk::users::storage::{self as user_storage, User};

static POOL: OnceCell<DbPool> = OnceCell::new();
static LOCK: Mutex<()> = Mutex::const_new(());

fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok().filter(|url| !url.is_empty())
}

/// Pool plus the lock guard, or `None` when no test database is configured.
async fn database() -> Option<(DbPool, MutexGuard<'static, ()>)> {
    let url = database_url()?;
    let guard = LOCK.lock().await;
    let pool = POOL
        .get_or_init(|| {
            let pool = create_pool(&url, 4).unwrap();
            run_migrations(&pool).unwrap();
            pool
        })
        .clone();
    Some((pool, guard))
}

fn tag() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn new_user(conn: &mut PgConnection, name: &str, role: UserRole) -> User {
    let email = format!("{name}.{}@example.com", tag());
    user_storage::insert_user(conn, &User::new(name.into(), email, role)).unwrap()
}

fn draft(title: &str, stage: TicketStage) -> TicketDraft {
    TicketDraft {
        title: format!("{title} {}", tag()),
        stage,
        ..Default::default()
    }
}

fn clear_stage(conn: &mut PgConnection, stage: TicketStage) {
    diesel::delete(tickets::table.filter(tickets::stage.eq(stage)))
        .execute(conn)
        .unwrap();
}

#[tokio::test]
async fn test_move_to_stage_appends_and_logs() {
    let Some((pool, _guard)) = database().await else { return };
    let conn = &mut pool.get().unwrap();
    let agent = new_user(conn, "mover", UserRole::User);

    let existing = ticket_storage::create_ticket(conn, draft("Already there", TicketStage::Homolog), agent.id).unwrap();
    let ticket = ticket_storage::create_ticket(conn, draft("Login fails", TicketStage::Backlog), agent.id).unwrap();

    let moved = ticket_storage::move_to_stage(conn, ticket.id, TicketStage::Homolog, agent.id).unwrap();
    assert_eq!(moved.stage, TicketStage::Homolog);
    assert!(moved.position > existing.position);

    let again = ticket_storage::move_to_stage(conn, ticket.id, TicketStage::Homolog, agent.id).unwrap();
    assert_eq!(again.position, moved.position);

    let activities = ticket_storage::list_activities(conn, ticket.id).unwrap();
    let stage_changes: Vec<_> = activities.iter().filter(|a| a.action == "stage_changed").collect();
    assert_eq!(stage_changes.len(), 1);
    assert_eq!(stage_changes[0].details["to"], "homolog");
    assert_eq!(stage_changes[0].user_id, Some(agent.id));

    let missing = ticket_storage::move_to_stage(conn, Uuid::new_v4(), TicketStage::Dev, agent.id);
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_reorder_stage_requires_whole_column() {
    let Some((pool, _guard)) = database().await else { return };
    let conn = &mut pool.get().unwrap();
    let agent = new_user(conn, "sorter", UserRole::User);
    clear_stage(conn, TicketStage::Dev);

    let ids: Vec<Uuid> = (0..3)
        .map(|i| {
            ticket_storage::create_ticket(conn, draft(&format!("Card {i}"), TicketStage::Dev), agent.id)
                .unwrap()
                .id
        })
        .collect();

    // Listing two of three cards would leave the third on a colliding position.
    let partial = ticket_storage::reorder_stage(conn, TicketStage::Dev, &[ids[2], ids[0]]);
    match partial {
        Err(ApiError::BadRequest(message)) => assert!(message.contains("all 3 tickets")),
        other => panic!("expected a bad request, got {other:?}"),
    }

    let outsider = ticket_storage::create_ticket(conn, draft("Elsewhere", TicketStage::Prod), agent.id).unwrap();
    let foreign = ticket_storage::reorder_stage(conn, TicketStage::Dev, &[ids[0], ids[1], outsider.id]);
    assert!(matches!(foreign, Err(ApiError::BadRequest(_))));

    let order = [ids[2], ids[0], ids[1]];
    let column = ticket_storage::reorder_stage(conn, TicketStage::Dev, &order).unwrap();
    let got: Vec<(Uuid, i32)> = column.iter().map(|t| (t.id, t.position)).collect();
    assert_eq!(got, vec![(ids[2], 0), (ids[0], 1), (ids[1], 2)]);
}

#[tokio::test]
async fn test_comment_follows_author_and_mentions() {
    let Some((pool, _guard)) = database().await else { return };
    let conn = &mut pool.get().unwrap();
    let creator = new_user(conn, "creator", UserRole::User);
    let author = new_user(conn, "author", UserRole::User);
    let mentioned = new_user(conn, "helper", UserRole::User);
    let handle = mentioned.email.split('@').next().unwrap().to_string();

    let ticket = ticket_storage::create_ticket(conn, draft("Printer offline", TicketStage::Backlog), creator.id).unwrap();
    let comment = ticket_storage::add_comment(
        conn,
        ticket.id,
        author.id,
        format!("@{handle} can you take a look?"),
        &[handle.clone(), "nobody-by-that-name".into()],
    )
    .unwrap();

    let followers: Vec<Uuid> = ticket_storage::list_followers(conn, ticket.id)
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(followers.len(), 3);
    for id in [creator.id, author.id, mentioned.id] {
        assert!(followers.contains(&id));
    }

    let activities = ticket_storage::list_activities(conn, ticket.id).unwrap();
    let commented = activities.iter().find(|a| a.action == "commented").unwrap();
    assert_eq!(commented.details["comment_id"], comment.id.to_string());
    assert_eq!(commented.details["mentioned"], serde_json::json!([mentioned.id]));

    // A second comment does not duplicate follows.
    ticket_storage::add_comment(conn, ticket.id, author.id, "ping".into(), &[handle]).unwrap();
    assert_eq!(ticket_storage::list_followers(conn, ticket.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_save_snapshot_replaces_same_period() {
    let Some((pool, _guard)) = database().await else { return };
    let conn = &mut pool.get().unwrap();
    let admin = new_user(conn, "reporter", UserRole::Admin);
    let key = PeriodKey::week(2031, 7).unwrap();

    let first = report_storage::save_snapshot(conn, &key, &serde_json::json!({"total": 1}), admin.id).unwrap();
    let second = report_storage::save_snapshot(conn, &key, &serde_json::json!({"total": 5}), admin.id).unwrap();
    assert_eq!(second.period, "2031-W07");
    assert_eq!(second.kind, PeriodKind::Week);
    assert_eq!(second.payload["total"], 5);
    assert_eq!(second.id, first.id);

    let same_period: Vec<_> = report_storage::list_snapshots(conn, PeriodKind::Week)
        .unwrap()
        .into_iter()
        .filter(|r| r.period == "2031-W07")
        .collect();
    assert_eq!(same_period.len(), 1);

    let found = report_storage::find_snapshot(conn, &key).unwrap().unwrap();
    assert_eq!(found.payload["total"], 5);
    assert_eq!(report_storage::delete_snapshot(conn, &key).unwrap(), 1);
}

#[tokio::test]
async fn test_deleting_user_keeps_their_tickets_and_files() {
    let Some((pool, _guard)) = database().await else { return };
    let conn = &mut pool.get().unwrap();
    let leaver = new_user(conn, "leaver", UserRole::User);
    let ticket = ticket_storage::create_ticket(conn, draft("Handover", TicketStage::Backlog), leaver.id).unwrap();

    let document = Document {
        id: Uuid::new_v4(),
        ticket_id: Some(ticket.id),
        uploaded_by: Some(leaver.id),
        original_name: "handover.pdf".into(),
        stored_name: format!("{}.pdf", Uuid::new_v4()),
        mime_type: "application/pdf".into(),
        size_bytes: 10,
        created_at: chrono::Utc::now(),
    };
    diesel::insert_into(documents::table).values(&document).execute(conn).unwrap();

    assert_eq!(user_storage::delete_user(conn, leaver.id).unwrap(), 1);

    let kept = ticket_storage::find_ticket(conn, ticket.id).unwrap();
    assert_eq!(kept.creator_id, None);
    let kept_document: Document = documents::table
        .find(document.id)
        .select(Document::as_select())
        .first(conn)
        .unwrap();
    assert_eq!(kept_document.uploaded_by, None);
    assert_eq!(kept_document.ticket_id, Some(ticket.id));
}

#[tokio::test]
async fn test_ticket_create_and_delete_over_http() {
    let Some((pool, _guard)) = database().await else { return };
    let admin = {
        let conn = &mut pool.get().unwrap();
        new_user(conn, "admin", UserRole::Admin)
    };

    let env: HashMap<String, String> = [
        ("DATABASE_URL", database_url().unwrap_or_default()),
        ("JWT_SECRET", "postgres-test-secret-0123456789abcdef".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let config = AppConfig::from_map(&env).unwrap();
    let passwords =
        PasswordService::new(Argon2Config::low_memory(), PasswordPolicy::default()).unwrap();
    let state = Arc::new(AppState::new(config, pool.clone(), passwords, None).unwrap());
    let token = state
        .jwt
        .generate_token_pair(&TokenSubject {
            user_id: admin.id,
            email: admin.email.clone(),
            name: admin.name.clone(),
            role: UserRole::Admin,
        })
        .unwrap()
        .access_token;
    let app = build_router(state);
    let bearer = format!("Bearer {token}");

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/tickets")
                .header(header::AUTHORIZATION, &bearer)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "title": "  VPN drops every hour ",
                        "description": "Since Monday",
                        "priority": "high",
                        "type": "incident",
                        "stage": "dev"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(created["title"], "VPN drops every hour");
    assert_eq!(created["description"], "Since Monday");
    assert_eq!(created["priority"], "high");
    assert_eq!(created["type"], "incident");
    assert_eq!(created["stage"], "dev");
    assert_eq!(created["status"], "open");
    assert_eq!(created["creator_id"], admin.id.to_string());
    let id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::delete(format!("/api/tickets/{id}"))
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::get(format!("/api/tickets/{id}"))
                .header(header::AUTHORIZATION, &bearer)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
