//! HTTP API endpoint handlers (read-only, operational).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    infrastructure::dto::http::{BrokerStatsDto, QueueSnapshotDto, SessionSummaryDto},
    ui::state::AppState,
    usecase::QueryError,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Current pending queue, front first
pub async fn get_queue(State(state): State<Arc<AppState>>) -> Json<QueueSnapshotDto> {
    let requests: Vec<String> = state
        .get_queue_usecase
        .execute()
        .await
        .into_iter()
        .map(|id| id.into_string())
        .collect();
    Json(QueueSnapshotDto {
        length: requests.len(),
        requests,
    })
}

/// Get session summary by citizen external id
pub async fn get_session_detail(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummaryDto>, StatusCode> {
    match state.get_session_detail_usecase.execute(session_id).await {
        // Domain Model から DTO への変換
        Ok(summary) => Ok(Json(summary.into())),
        Err(QueryError::SessionNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(QueryError::InvalidSessionId(_)) => Err(StatusCode::BAD_REQUEST),
    }
}

/// Broker-wide counters
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<BrokerStatsDto> {
    let stats = state.get_stats_usecase.execute().await;
    Json(BrokerStatsDto {
        connections: stats.connections,
        admins: stats.admins,
        pending: stats.pending,
        requested: stats.sessions.requested,
        joined: stats.sessions.joined,
        active: stats.sessions.active,
        closed: stats.sessions.closed,
    })
}
