pub mod handlers;
pub mod import;
pub mod kanban;
pub mod mentions;
pub mod storage;
pub mod types;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub use types::Ticket;

use handlers::*;

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TICKETS, get(list_tickets).post(create_ticket))
        .route(ApiUrls::TICKET_KANBAN, get(kanban_board))
        .route(ApiUrls::TICKET_REORDER, put(reorder))
        .route(ApiUrls::TICKET_IMPORT, post(import_tickets))
        .route(
            ApiUrls::TICKET_BY_ID,
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route(ApiUrls::TICKET_STAGE, put(move_stage))
        .route(
            ApiUrls::TICKET_COMMENTS,
            get(list_comments).post(add_comment),
        )
        .route(ApiUrls::TICKET_COMMENT_BY_ID, axum::routing::delete(delete_comment))
        .route(
            ApiUrls::TICKET_FOLLOW,
            post(follow_ticket).delete(unfollow_ticket),
        )
        .route(ApiUrls::TICKET_FOLLOWERS, get(list_followers))
        .route(ApiUrls::TICKET_ACTIVITIES, get(list_activities))
}
