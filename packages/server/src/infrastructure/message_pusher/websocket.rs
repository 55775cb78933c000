//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの有界 `mpsc::Sender` を管理
//! - `try_send` による非ブロッキング送信（push_to, broadcast）
//!
//! ## 設計ノート
//!
//! WebSocket の受付と writer タスクの生成は UI 層（`ui/handler/websocket.rs`）で行います。
//! ここでは sender を受け取り、フレームの投入だけを担当します。
//! バッファが満杯の接続へのフレームは破棄され（DELIVERY_SKIPPED）、
//! 履歴の再送で整合性を回復します。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc::error::TrySendError};

use crate::domain::{ConnectionId, MessagePushError, MessagePusher, PusherChannel};

/// WebSocket を使った MessagePusher 実装
#[derive(Default)]
pub struct WebSocketMessagePusher {
    /// 接続中のクライアントの outbound sender
    clients: RwLock<HashMap<ConnectionId, PusherChannel>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録済みの接続数
    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.len()
    }

    fn try_push(
        connection_id: &ConnectionId,
        sender: &PusherChannel,
        content: &str,
    ) -> Result<(), MessagePushError> {
        sender.try_send(content.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => MessagePushError::BufferFull(connection_id.to_string()),
            TrySendError::Closed(_) => MessagePushError::ChannelClosed(connection_id.to_string()),
        })
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut clients = self.clients.write().await;
        clients.insert(connection_id, sender);
        tracing::debug!(%connection_id, "Connection registered to MessagePusher");
    }

    async fn unregister_client(&self, connection_id: &ConnectionId) {
        let mut clients = self.clients.write().await;
        clients.remove(connection_id);
        tracing::debug!(%connection_id, "Connection unregistered from MessagePusher");
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        let clients = self.clients.read().await;
        let sender = clients
            .get(connection_id)
            .ok_or_else(|| MessagePushError::ClientNotFound(connection_id.to_string()))?;

        match Self::try_push(connection_id, sender, content) {
            Ok(()) => {
                tracing::debug!(%connection_id, "Pushed frame");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%connection_id, "{}", e);
                Err(e)
            }
        }
    }

    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> usize {
        let clients = self.clients.read().await;
        let mut delivered = 0;

        for connection_id in targets {
            let Some(sender) = clients.get(connection_id) else {
                // 切断済みの受信者はスキップし、履歴で回復させる
                tracing::warn!(%connection_id, "Delivery skipped: connection not registered");
                continue;
            };
            match Self::try_push(connection_id, sender, content) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(%connection_id, "{}", e),
            }
        }

        delivered
    }
}
