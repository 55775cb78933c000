//! The broker's process-wide state: connection registry, pending queue,
//! session registry, message relay and admin dispatch.
//!
//! Connection handlers never touch this state directly; they go through the
//! use cases, which call the contracts exposed here.

pub mod admin_dispatch;
pub mod connection_registry;
pub mod message_relay;
pub mod pending_queue;
pub mod session_registry;
pub mod sweeper;

use std::sync::Arc;

use concierge_shared::time::Clock;

use crate::{
    config::BrokerConfig,
    domain::{MessagePusher, TranscriptArchive},
};

pub use admin_dispatch::AdminDispatcher;
pub use connection_registry::ConnectionRegistry;
pub use message_relay::MessageRelay;
pub use pending_queue::SharedPendingQueue;
pub use session_registry::{
    PolicyAction, RequestOutcome, SessionCounts, SessionRegistry, SessionSummary,
};
pub use sweeper::{PolicySweeper, SweepReport};

/// All broker components, wired together
pub struct Broker {
    pub config: BrokerConfig,
    pub message_pusher: Arc<dyn MessagePusher>,
    pub connections: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<AdminDispatcher>,
    pub queue: Arc<SharedPendingQueue>,
    pub sessions: Arc<SessionRegistry>,
    pub relay: Arc<MessageRelay>,
}

impl Broker {
    pub fn new(
        config: BrokerConfig,
        message_pusher: Arc<dyn MessagePusher>,
        archive: Arc<dyn TranscriptArchive>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(clock.clone()));
        let dispatcher = Arc::new(AdminDispatcher::new(message_pusher.clone()));
        let queue = Arc::new(SharedPendingQueue::new(dispatcher.clone()));
        let sessions = Arc::new(SessionRegistry::new(
            queue.clone(),
            dispatcher.clone(),
            message_pusher.clone(),
            archive,
            clock,
            config.clone(),
        ));
        let relay = Arc::new(MessageRelay::new(sessions.clone(), message_pusher.clone()));

        Self {
            config,
            message_pusher,
            connections,
            dispatcher,
            queue,
            sessions,
            relay,
        }
    }

    pub fn sweeper(&self) -> PolicySweeper {
        PolicySweeper::new(self.sessions.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for broker tests: a broker on a manual clock with real
    //! channels so tests can read what each connection received.

    use std::sync::Arc;

    use concierge_shared::time::ManualClock;
    use tokio::sync::mpsc;

    use super::Broker;
    use crate::{
        config::BrokerConfig,
        domain::{ConnectionId, ExternalId, MessagePusher},
        infrastructure::{
            message_pusher::WebSocketMessagePusher, repository::InMemoryTranscriptArchive,
        },
    };

    pub struct TestBroker {
        pub broker: Broker,
        pub pusher: Arc<WebSocketMessagePusher>,
        pub archive: Arc<InMemoryTranscriptArchive>,
        pub clock: Arc<ManualClock>,
    }

    /// A connection's outbound side, as a test sees it
    pub struct TestConnection {
        pub id: ConnectionId,
        pub rx: mpsc::Receiver<String>,
    }

    impl TestConnection {
        /// All frames received so far, parsed
        pub fn drain(&mut self) -> Vec<serde_json::Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&frame).unwrap());
            }
            frames
        }

        /// Frames of one `type`, parsed
        pub fn drain_type(&mut self, event_type: &str) -> Vec<serde_json::Value> {
            self.drain()
                .into_iter()
                .filter(|f| f["type"] == event_type)
                .collect()
        }
    }

    pub fn test_broker(config: BrokerConfig) -> TestBroker {
        let pusher = Arc::new(WebSocketMessagePusher::new());
        let archive = Arc::new(InMemoryTranscriptArchive::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let broker = Broker::new(config, pusher.clone(), archive.clone(), clock.clone());
        TestBroker {
            broker,
            pusher,
            archive,
            clock,
        }
    }

    impl TestBroker {
        /// Open an outbound channel for a new connection id
        pub async fn open(&self) -> TestConnection {
            let id = ConnectionId::generate();
            let (tx, rx) = mpsc::channel(256);
            self.pusher.register_client(id, tx).await;
            TestConnection { id, rx }
        }

        /// Open and register an admin console
        pub async fn admin(&self) -> TestConnection {
            let conn = self.open().await;
            self.broker
                .dispatcher
                .on_admin_connect(conn.id, &self.broker.queue)
                .await;
            conn
        }
    }

    pub fn id(value: &str) -> ExternalId {
        ExternalId::new(value.to_string()).unwrap()
    }
}
