//! UseCase: admin によるセッションの claim
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - JoinSessionUseCase::execute() メソッド
//!
//! ### なぜこのテストが必要か
//! - 同時 claim でも勝者が 1 人に決まる排他性の保証
//! - citizen が admin_join を送った場合に拒否されることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：待機中セッションの claim
//! - 異常系：claim 済みセッション、存在しないセッション、不正な ID

use std::sync::Arc;

use crate::{
    broker::SessionRegistry,
    domain::{ChatSession, ExternalId, Participant, Role},
};

use super::{error::CommandError, require_role};

/// セッション claim のユースケース
pub struct JoinSessionUseCase {
    sessions: Arc<SessionRegistry>,
}

impl JoinSessionUseCase {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// # Errors
    ///
    /// - `ForbiddenForRole` - admin 以外からの要求
    /// - `InvalidPayload` - `session_id` が外部 ID として不正
    /// - `Session(AlreadyClaimed | SessionNotFound)` - claim 失敗（状態は変化しない）
    pub async fn execute(
        &self,
        participant: &Participant,
        session_id: String,
    ) -> Result<ChatSession, CommandError> {
        require_role(participant, Role::Admin, "admin_join")?;
        let session_id = ExternalId::try_from(session_id)?;
        let session = self
            .sessions
            .claim(&session_id, participant.connection_id)
            .await?;
        Ok(session)
    }
}
