//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 送信者の検証、履歴への追加、両端への配送
//!
//! ### なぜこのテストが必要か
//! - `sender` フィールドの詐称を防ぐ
//! - シーケンス番号が送信順に振られ、履歴と一致することを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：citizen / admin 双方からの送信
//! - 異常系：待機中・クローズ済みセッションへの送信、空メッセージ、ロールと sender の不一致

use std::sync::Arc;

use crate::{
    broker::MessageRelay,
    domain::{ChatMessage, ExternalId, MessageText, Participant, Sender},
};

use super::error::CommandError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    relay: Arc<MessageRelay>,
}

impl SendMessageUseCase {
    pub fn new(relay: Arc<MessageRelay>) -> Self {
        Self { relay }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `participant` - 送信元の接続
    /// * `session_id` - 宛先セッション（citizen の外部 ID）
    /// * `sender` - Payload に書かれた送信者
    /// * `text` - 本文
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - 採番済みのメッセージ（配送は完了済み）
    /// * `Err(CommandError)` - 送信失敗（履歴は変化しない）
    pub async fn execute(
        &self,
        participant: &Participant,
        session_id: String,
        sender: Sender,
        text: String,
    ) -> Result<ChatMessage, CommandError> {
        // 1. sender とロールの一致を確認
        if Sender::from(participant.role) != sender {
            return Err(CommandError::SenderMismatch {
                claimed: sender,
                role: participant.role,
            });
        }

        // 2. Payload を Domain Model に変換
        let session_id = ExternalId::try_from(session_id)?;
        let text = MessageText::try_from(text)?;

        // 3. 追記して両端へ配送
        let message = self
            .relay
            .relay(&participant.connection_id, &session_id, sender, text)
            .await?;
        Ok(message)
    }
}
