//! UseCase: セッション詳細の取得

use std::sync::Arc;

use crate::{
    broker::{SessionRegistry, SessionSummary},
    domain::ExternalId,
};

use super::error::QueryError;

/// セッション詳細取得のユースケース
pub struct GetSessionDetailUseCase {
    sessions: Arc<SessionRegistry>,
}

impl GetSessionDetailUseCase {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    pub async fn execute(&self, session_id: String) -> Result<SessionSummary, QueryError> {
        let session_id = ExternalId::try_from(session_id)?;
        self.sessions
            .get(&session_id)
            .await
            .ok_or_else(|| QueryError::SessionNotFound(session_id.into_string()))
    }
}
