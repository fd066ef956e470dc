//! HTTP server initialization and routing

use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::cors::create_cors_layer;

use super::{health_check, health_check_simple, shutdown_signal};

/// Room for multipart framing on top of the largest accepted file.
const BODY_LIMIT_MARGIN: usize = 1024 * 1024;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check_simple))
        .route(ApiUrls::HEALTH, get(health_check))
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::users::configure_users_routes())
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::documents::configure_documents_routes())
        .merge(crate::reminders::configure_reminders_routes())
        .merge(crate::manuals::configure_manuals_routes())
        .merge(crate::workflows::configure_workflows_routes())
        .merge(crate::reports::configure_reports_routes())
        .merge(crate::chat::configure_chat_routes())
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state
        .config
        .uploads
        .max_bytes
        .saturating_add(BODY_LIMIT_MARGIN);
    let cors = create_cors_layer(&app_state.config.cors_origins);

    let mut app = api_router().with_state(app_state.clone());

    match &app_state.config.server.static_dir {
        Some(dir) if dir.is_dir() => {
            info!("Serving frontend from {}", dir.display());
            let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            app = app.fallback_service(spa);
        }
        Some(dir) => warn!("STATIC_DIR {} is not a directory, frontend disabled", dir.display()),
        None => {}
    }

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let bind = app_state.config.bind_address();
    let addr: SocketAddr = bind.parse().map_err(|e| {
        error!("Invalid bind address {bind}: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;
    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e} - is another instance running?");
            return Err(e);
        }
    };
    info!("HTTP server listening on {addr}");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(std::io::Error::other)
}
