//! Domain layer: value objects, entities, errors and the ports the broker
//! depends on.

pub mod entity;
pub mod error;
pub mod message_pusher;
pub mod pending_queue;
pub mod repository;
pub mod value_object;

pub use entity::{
    AdminDropOutcome, ChatMessage, ChatSession, Participant, Role, Sender, SessionEvent,
    SessionState, Transcript,
};
pub use error::{ArchiveError, MessagePushError, SessionError, ValueObjectError};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use pending_queue::PendingQueue;
pub use repository::TranscriptArchive;
pub use value_object::{ConnectionId, ExternalId, MessageText, Timestamp};

#[cfg(test)]
pub use message_pusher::MockMessagePusher;
#[cfg(test)]
pub use repository::MockTranscriptArchive;
