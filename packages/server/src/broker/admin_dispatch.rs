//! Admin Dispatch Facade.
//!
//! Keeps the set of connected admin consoles and fans queue snapshots and
//! session lifecycle events out to all of them, so every console shows the
//! same picture even though only one admin can hold a given session.

use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    domain::{ConnectionId, ExternalId, MessagePusher, SessionEvent},
    infrastructure::dto::websocket::ServerEvent,
};

use super::pending_queue::SharedPendingQueue;

pub struct AdminDispatcher {
    admins: RwLock<BTreeSet<ConnectionId>>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl AdminDispatcher {
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            admins: RwLock::new(BTreeSet::new()),
            message_pusher,
        }
    }

    /// Register an admin console and push it the current queue snapshot.
    ///
    /// The snapshot is pushed while the queue is locked, so no later
    /// queue change can overtake it.
    pub async fn on_admin_connect(&self, connection_id: ConnectionId, queue: &SharedPendingQueue) {
        let newly_registered = self.admins.write().await.insert(connection_id);
        if newly_registered {
            tracing::info!(%connection_id, "Admin console registered");
        }
        queue.publish_snapshot_to(&connection_id).await;
    }

    /// Remove an admin console. Returns `false` if it was not registered.
    pub async fn unregister_admin(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.admins.write().await.remove(connection_id);
        if removed {
            tracing::info!(%connection_id, "Admin console unregistered");
        }
        removed
    }

    pub async fn is_admin(&self, connection_id: &ConnectionId) -> bool {
        self.admins.read().await.contains(connection_id)
    }

    pub async fn admin_count(&self) -> usize {
        self.admins.read().await.len()
    }

    async fn fan_out(&self, event: &ServerEvent) -> usize {
        let targets: Vec<ConnectionId> = self.admins.read().await.iter().copied().collect();
        if targets.is_empty() {
            return 0;
        }
        self.message_pusher.broadcast(&targets, &event.to_frame()).await
    }

    /// Push a full queue snapshot to one admin
    pub async fn push_snapshot(&self, connection_id: &ConnectionId, snapshot: &[ExternalId]) {
        let event = pending_requests(snapshot);
        // 失敗は pusher 側でログ済み
        let _ = self
            .message_pusher
            .push_to(connection_id, &event.to_frame())
            .await;
    }

    /// Fan a full queue snapshot out to every admin
    pub async fn on_queue_changed(&self, snapshot: &[ExternalId]) -> usize {
        self.fan_out(&pending_requests(snapshot)).await
    }

    /// Tell every admin that the queue grew by one
    pub async fn on_new_request(&self, citizen_id: &ExternalId) -> usize {
        self.fan_out(&ServerEvent::NewRequest {
            citizen_id: citizen_id.as_str().to_string(),
        })
        .await
    }

    /// Fan a session lifecycle event out to every admin
    pub async fn on_session_event(&self, session_id: &ExternalId, event: SessionEvent) -> usize {
        tracing::debug!(%session_id, ?event, "Dispatching session event to admins");
        self.fan_out(&ServerEvent::SessionEvent {
            session_id: session_id.as_str().to_string(),
            event,
        })
        .await
    }
}

fn pending_requests(snapshot: &[ExternalId]) -> ServerEvent {
    ServerEvent::PendingRequests {
        requests: snapshot.iter().map(|id| id.as_str().to_string()).collect(),
    }
}
