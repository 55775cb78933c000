//! UseCase: 参加者接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectParticipantUseCase::execute() メソッド
//! - 接続の登録、`connected` の送信、citizen の既存セッションへの再接続
//!
//! ### なぜこのテストが必要か
//! - 再接続した citizen が新しいセッションではなく同じセッションに紐づくことを保証
//! - admin の外部 ID が省略された場合に一意な ID が割り当てられることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：citizen / admin の新規接続
//! - エッジケース：猶予期間中の citizen の再接続（履歴の再送）

use std::sync::Arc;

use crate::{
    broker::{ConnectionRegistry, SessionRegistry},
    domain::{ConnectionId, ExternalId, MessagePusher, Participant, PusherChannel, Role},
    infrastructure::dto::websocket::ServerEvent,
};

/// 参加者接続のユースケース
pub struct ConnectParticipantUseCase {
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectParticipantUseCase {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
    ) -> Self {
        Self {
            connections,
            sessions,
            message_pusher,
        }
    }

    /// 参加者接続を実行
    ///
    /// # Arguments
    ///
    /// * `role` - ハンドシェイクで決まったロール
    /// * `external_id` - 外部 ID（admin は省略可）
    /// * `channel` - この接続への送信用チャンネル
    ///
    /// citizen の場合、開いているセッションがあればこの接続を紐づけ直し、
    /// 履歴を再送します。
    pub async fn execute(
        &self,
        role: Role,
        external_id: Option<ExternalId>,
        channel: PusherChannel,
    ) -> Participant {
        let connection_id = ConnectionId::generate();
        let external_id =
            external_id.unwrap_or_else(|| ExternalId::anonymous_admin(&connection_id));

        // 1. MessagePusher にクライアントを登録
        self.message_pusher
            .register_client(connection_id, channel)
            .await;

        // 2. Connection Registry に登録
        let participant = self
            .connections
            .register(connection_id, role, external_id)
            .await;

        // 3. 接続完了を通知
        let connected = ServerEvent::Connected {
            connection_id: connection_id.to_string(),
            role,
            external_id: participant.external_id.as_str().to_string(),
        };
        let _ = self
            .message_pusher
            .push_to(&connection_id, &connected.to_frame())
            .await;

        // 4. citizen の再接続なら既存セッションに紐づけ直す
        if role == Role::Citizen
            && let Some(session) = self
                .sessions
                .reattach_citizen(&participant.external_id, connection_id)
                .await
        {
            tracing::info!(
                session_id = %session.session_id,
                %connection_id,
                state = ?session.state,
                "Citizen reconnected to existing session"
            );
        }

        participant
    }
}
