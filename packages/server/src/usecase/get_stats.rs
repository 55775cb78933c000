//! UseCase: ブローカー全体の統計

use std::sync::Arc;

use crate::broker::{
    AdminDispatcher, ConnectionRegistry, SessionCounts, SessionRegistry, SharedPendingQueue,
};

/// 統計値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub connections: usize,
    pub admins: usize,
    pub pending: usize,
    pub sessions: SessionCounts,
}

/// 統計取得のユースケース
pub struct GetStatsUseCase {
    connections: Arc<ConnectionRegistry>,
    dispatcher: Arc<AdminDispatcher>,
    queue: Arc<SharedPendingQueue>,
    sessions: Arc<SessionRegistry>,
}

impl GetStatsUseCase {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        dispatcher: Arc<AdminDispatcher>,
        queue: Arc<SharedPendingQueue>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            connections,
            dispatcher,
            queue,
            sessions,
        }
    }

    /// 各値は個別に取得するため、厳密な同時点のスナップショットではない
    pub async fn execute(&self) -> BrokerStats {
        BrokerStats {
            connections: self.connections.count().await,
            admins: self.dispatcher.admin_count().await,
            pending: self.queue.len().await,
            sessions: self.sessions.counts().await,
        }
    }
}
