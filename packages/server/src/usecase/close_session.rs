//! UseCase: admin によるセッションのクローズ

use std::sync::Arc;

use crate::{
    broker::SessionRegistry,
    domain::{ChatSession, ExternalId, Participant, Role},
};

use super::{error::CommandError, require_role};

/// セッションクローズのユースケース
pub struct CloseSessionUseCase {
    sessions: Arc<SessionRegistry>,
}

impl CloseSessionUseCase {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// 保持している JOINED / ACTIVE セッションを閉じる。
    ///
    /// トランスクリプトはクローズ後にアーカイブへ渡されます。
    pub async fn execute(
        &self,
        participant: &Participant,
        session_id: String,
    ) -> Result<ChatSession, CommandError> {
        require_role(participant, Role::Admin, "close_session")?;
        let session_id = ExternalId::try_from(session_id)?;
        let session = self
            .sessions
            .close(&session_id, &participant.connection_id)
            .await?;
        Ok(session)
    }
}
