//! Pending Request Queue shared by the whole broker.
//!
//! Wraps the pure [`PendingQueue`] in a lock and publishes a fresh snapshot
//! to every admin console on each mutation. Snapshots are published while
//! the lock is held so consoles receive them in mutation order.
//!
//! Callers mutate the queue only while holding the slot lock of the session
//! concerned; that keeps "queued iff `REQUESTED`" true at every point.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{ConnectionId, ExternalId, PendingQueue};

use super::admin_dispatch::AdminDispatcher;

pub struct SharedPendingQueue {
    queue: Mutex<PendingQueue>,
    dispatcher: Arc<AdminDispatcher>,
}

impl SharedPendingQueue {
    pub fn new(dispatcher: Arc<AdminDispatcher>) -> Self {
        Self {
            queue: Mutex::new(PendingQueue::new()),
            dispatcher,
        }
    }

    /// Take the queue lock for a batch of changes made together with a
    /// session transition. Nothing is published until [`QueueGuard::publish`].
    pub async fn lock(&self) -> QueueGuard<'_> {
        QueueGuard {
            queue: self.queue.lock().await,
            dispatcher: &self.dispatcher,
            new_requests: Vec::new(),
            changed: false,
        }
    }

    /// Append at the back (idempotent). Publishes `new_request` and a
    /// snapshot when the queue actually grew.
    pub async fn enqueue(&self, citizen_id: ExternalId) -> bool {
        let mut queue = self.lock().await;
        let grew = queue.enqueue(citizen_id);
        queue.publish().await;
        grew
    }

    /// Put a citizen back at the front after its admin went away
    pub async fn requeue_front(&self, citizen_id: ExternalId) -> bool {
        let mut queue = self.lock().await;
        let grew = queue.requeue_front(citizen_id);
        queue.publish().await;
        grew
    }

    /// Remove on claim or abandonment
    pub async fn dequeue(&self, citizen_id: &ExternalId) -> bool {
        let mut queue = self.lock().await;
        let removed = queue.dequeue(citizen_id);
        queue.publish().await;
        removed
    }

    pub async fn snapshot(&self) -> Vec<ExternalId> {
        self.queue.lock().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn contains(&self, citizen_id: &ExternalId) -> bool {
        self.queue.lock().await.contains(citizen_id)
    }

    /// Push the current snapshot to a single admin console
    pub async fn publish_snapshot_to(&self, connection_id: &ConnectionId) {
        let queue = self.queue.lock().await;
        self.dispatcher
            .push_snapshot(connection_id, &queue.snapshot())
            .await;
    }
}

/// Held queue lock. Mutations are synchronous; the resulting notifications
/// go out in [`QueueGuard::publish`], still under the lock.
pub struct QueueGuard<'a> {
    queue: MutexGuard<'a, PendingQueue>,
    dispatcher: &'a AdminDispatcher,
    new_requests: Vec<ExternalId>,
    changed: bool,
}

impl QueueGuard<'_> {
    pub fn enqueue(&mut self, citizen_id: ExternalId) -> bool {
        if !self.queue.enqueue(citizen_id.clone()) {
            return false;
        }
        tracing::info!(session_id = %citizen_id, queue_length = self.queue.len(), "Citizen enqueued");
        self.new_requests.push(citizen_id);
        self.changed = true;
        true
    }

    pub fn requeue_front(&mut self, citizen_id: ExternalId) -> bool {
        if !self.queue.enqueue_front(citizen_id.clone()) {
            return false;
        }
        tracing::info!(session_id = %citizen_id, queue_length = self.queue.len(), "Citizen requeued at front");
        self.changed = true;
        true
    }

    pub fn dequeue(&mut self, citizen_id: &ExternalId) -> bool {
        if !self.queue.dequeue(citizen_id) {
            return false;
        }
        tracing::debug!(session_id = %citizen_id, queue_length = self.queue.len(), "Citizen dequeued");
        self.changed = true;
        true
    }

    /// Send `new_request` for every enqueued citizen and one snapshot, then
    /// release the lock
    pub async fn publish(self) {
        if !self.changed {
            return;
        }
        for citizen_id in &self.new_requests {
            self.dispatcher.on_new_request(citizen_id).await;
        }
        self.dispatcher
            .on_queue_changed(&self.queue.snapshot())
            .await;
    }
}
