//! UseCase: 参加者切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectParticipantUseCase::execute() メソッド
//! - 切断時のセッション状態遷移（citizen の切り離し、admin の解放）
//!
//! ### なぜこのテストが必要か
//! - 切断が黙って捨てられず、必ずセッションの遷移に繋がることを保証
//! - admin 切断時にセッションがキュー先頭へ戻ることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：citizen / admin の切断
//! - 異常系：登録されていない接続の切断（何もしない）

use std::sync::Arc;

use crate::{
    broker::{AdminDispatcher, ConnectionRegistry, SessionRegistry},
    domain::{ConnectionId, MessagePusher, Participant, Role},
};

/// 参加者切断のユースケース
pub struct DisconnectParticipantUseCase {
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<AdminDispatcher>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectParticipantUseCase {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        dispatcher: Arc<AdminDispatcher>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            connections,
            sessions,
            dispatcher,
            message_pusher,
        }
    }

    /// 参加者切断を実行
    ///
    /// # Returns
    ///
    /// 切断された参加者。登録されていない接続なら `None`。
    pub async fn execute(&self, connection_id: &ConnectionId) -> Option<Participant> {
        // 1. 送信先から外す（以降の配送はスキップされる）
        self.message_pusher.unregister_client(connection_id).await;

        // 2. Connection Registry から削除
        let participant = self.connections.unregister(connection_id).await?;

        // 3. セッション側の遷移
        match participant.role {
            Role::Citizen => {
                self.sessions
                    .detach_citizen(&participant.external_id, connection_id)
                    .await;
            }
            Role::Admin => {
                self.dispatcher.unregister_admin(connection_id).await;
                let released = self.sessions.release_admin(connection_id).await;
                if !released.is_empty() {
                    tracing::info!(
                        %connection_id,
                        released = released.len(),
                        "Released sessions held by disconnected admin"
                    );
                }
            }
        }

        Some(participant)
    }
}
