//! MessagePusher trait 定義
//!
//! ドメイン層が必要とする「接続へのメッセージ送信」のインターフェース。
//! 具体的な実装（WebSocket）は Infrastructure 層が提供します。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{error::MessagePushError, value_object::ConnectionId};

/// Outbound channel of one connection. Bounded: senders never wait on it.
pub type PusherChannel = mpsc::Sender<String>;

/// Push serialized frames to live connections.
///
/// Implementations must not block: a recipient that cannot take a frame
/// right now is skipped (`DELIVERY_SKIPPED`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// Register the outbound channel of a new connection
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel);

    /// Forget a connection's outbound channel
    async fn unregister_client(&self, connection_id: &ConnectionId);

    /// Push a frame to one connection
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// Push a frame to several connections; individual failures are logged
    /// and skipped. Returns how many recipients accepted the frame.
    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> usize;
}
