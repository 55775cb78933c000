//! UseCase: ヘルプ要求（citizen → broker）

use std::sync::Arc;

use crate::{
    broker::{RequestOutcome, SessionRegistry},
    domain::{Participant, Role},
};

use super::{error::CommandError, require_role};

/// ヘルプ要求のユースケース
pub struct RequestHelpUseCase {
    sessions: Arc<SessionRegistry>,
}

impl RequestHelpUseCase {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// セッションを作成してキューに入れる。開いているセッションがあれば紐づけ直す。
    ///
    /// セッションキーはハンドシェイク時の外部 ID です。
    pub async fn execute(&self, participant: &Participant) -> Result<RequestOutcome, CommandError> {
        require_role(participant, Role::Citizen, "request_help")?;
        Ok(self
            .sessions
            .create(&participant.external_id, participant.connection_id)
            .await)
    }
}
