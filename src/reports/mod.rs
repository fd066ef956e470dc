//! Ticket statistics per week, month and quarter, live or as saved snapshots.

pub mod period;
pub mod stats;
pub mod storage;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::info;
use serde::Deserialize;
use std::sync::Arc;

use crate::core::error::ApiError;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::run_blocking;
use crate::core::urls::ApiUrls;
use crate::security::auth::{AdminUser, AuthenticatedUser};

use period::{PeriodKey, PeriodKind};
use stats::TicketStats;
use storage::SavedReport;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub period: String,
}

fn parse_period(raw: &str) -> Result<PeriodKey, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}

/// Statistics for `key` with the previous period attached.
pub fn stats_for(conn: &mut diesel::PgConnection, key: &PeriodKey) -> Result<TicketStats, ApiError> {
    let (_, end) = key.range();
    let previous_key = key.previous();
    let (previous_start, _) = previous_key.range();

    // One query covers both periods; compute_stats filters by creation time.
    let tickets = storage::tickets_created_between(conn, previous_start, end)?;
    let current = stats::compute_stats(key, &tickets);
    let previous = stats::compute_stats(&previous_key, &tickets);
    Ok(stats::compare(current, &previous))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TicketStats>, ApiError> {
    let key = match query.period.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => parse_period(raw)?,
        None => PeriodKey::current(PeriodKind::Week),
    };
    let stats = run_blocking(&state.conn, move |conn| stats_for(conn, &key)).await?;
    Ok(Json(stats))
}

pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<SavedReport>), ApiError> {
    let key = parse_period(&req.period)?;
    let user_id = user.user_id;
    let saved = run_blocking(&state.conn, move |conn| {
        let stats = stats_for(conn, &key)?;
        let payload =
            serde_json::to_value(&stats).map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(storage::save_snapshot(conn, &key, &payload, user_id)?)
    })
    .await?;
    info!("Report {} generated by {user_id}", saved.period);
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_kind(state: &AppState, kind: PeriodKind) -> Result<Json<Vec<SavedReport>>, ApiError> {
    let reports =
        run_blocking(&state.conn, move |conn| Ok(storage::list_snapshots(conn, kind)?)).await?;
    Ok(Json(reports))
}

pub async fn list_weekly(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<SavedReport>>, ApiError> {
    list_kind(&state, PeriodKind::Week).await
}

pub async fn list_monthly(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<SavedReport>>, ApiError> {
    list_kind(&state, PeriodKind::Month).await
}

pub async fn list_quarterly(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<SavedReport>>, ApiError> {
    list_kind(&state, PeriodKind::Quarter).await
}

pub async fn get_saved(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(period): Path<String>,
) -> Result<Json<SavedReport>, ApiError> {
    let key = parse_period(&period)?;
    let saved = run_blocking(&state.conn, move |conn| {
        storage::find_snapshot(conn, &key)?.ok_or_else(|| ApiError::not_found("Report"))
    })
    .await?;
    Ok(Json(saved))
}

pub async fn delete_saved(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Path(period): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = parse_period(&period)?;
    let deleted =
        run_blocking(&state.conn, move |conn| Ok(storage::delete_snapshot(conn, &key)?)).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Report"));
    }
    info!("Report {key} deleted by {}", admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_reports_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::REPORT_STATS, get(get_stats))
        .route(ApiUrls::REPORT_GENERATE, post(generate_report))
        .route(ApiUrls::REPORTS_WEEKLY, get(list_weekly))
        .route(ApiUrls::REPORTS_MONTHLY, get(list_monthly))
        .route(ApiUrls::REPORTS_QUARTERLY, get(list_quarterly))
        .route(ApiUrls::REPORT_SAVED, get(get_saved).delete(delete_saved))
}
