//! HTTP API response DTOs.

use serde::Serialize;

use crate::domain::SessionState;

/// Response for `GET /api/queue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshotDto {
    pub requests: Vec<String>,
    pub length: usize,
}

/// Response for `GET /api/sessions/{session_id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummaryDto {
    pub session_id: String,
    pub state: SessionState,
    pub citizen_connected: bool,
    pub admin_connection_id: Option<String>,
    pub message_count: usize,
    pub created_at: String,
    pub state_changed_at: String,
}

/// Response for `GET /api/stats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStatsDto {
    pub connections: usize,
    pub admins: usize,
    pub pending: usize,
    pub requested: usize,
    pub joined: usize,
    pub active: usize,
    pub closed: usize,
}
