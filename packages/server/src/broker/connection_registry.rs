//! Connection Registry.
//!
//! Maps every live transport connection to the participant behind it.
//! Session-side effects of (un)registration are driven by the connect and
//! disconnect use cases.

use std::{collections::HashMap, sync::Arc};

use concierge_shared::time::Clock;
use tokio::sync::RwLock;

use crate::domain::{ConnectionId, ExternalId, Participant, Role, Timestamp};

pub struct ConnectionRegistry {
    participants: RwLock<HashMap<ConnectionId, Participant>>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            participants: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Record a freshly handshaken connection
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        role: Role,
        external_id: ExternalId,
    ) -> Participant {
        let participant = Participant::new(
            connection_id,
            role,
            external_id,
            Timestamp::new(self.clock.now_millis()),
        );
        let mut participants = self.participants.write().await;
        participants.insert(connection_id, participant.clone());
        tracing::info!(
            %connection_id,
            ?role,
            external_id = %participant.external_id,
            total_connections = participants.len(),
            "Connection registered"
        );
        participant
    }

    /// Forget a connection. `None` when it was not registered.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> Option<Participant> {
        let mut participants = self.participants.write().await;
        let removed = participants.remove(connection_id);
        if let Some(participant) = &removed {
            tracing::info!(
                %connection_id,
                role = ?participant.role,
                remaining_connections = participants.len(),
                "Connection unregistered"
            );
        }
        removed
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Participant> {
        self.participants.read().await.get(connection_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.participants.read().await.len()
    }

    /// Live connections of one citizen or admin identity
    pub async fn connections_of(&self, external_id: &ExternalId) -> Vec<ConnectionId> {
        self.participants
            .read()
            .await
            .values()
            .filter(|p| &p.external_id == external_id)
            .map(|p| p.connection_id)
            .collect()
    }
}
