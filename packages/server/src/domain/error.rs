//! Domain error types.
//!
//! `SessionError` carries the broker's state-machine taxonomy; every variant
//! maps to one wire error code.

use thiserror::Error;

use super::entity::SessionState;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("external id must not be empty")]
    ExternalIdEmpty,

    #[error("external id must be at most {0} characters")]
    ExternalIdTooLong(usize),

    #[error("external id must not contain control characters")]
    ExternalIdInvalidCharacter,

    #[error("message text must not be empty")]
    MessageTextEmpty,

    #[error("message text must be at most {0} characters")]
    MessageTextTooLong(usize),
}

/// Session state-machine errors.
///
/// None of these mutate shared state; they are reported back to the
/// originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Another admin holds (or just won) the claim
    #[error("session '{0}' is already claimed")]
    AlreadyClaimed(String),

    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// Message on a session that is closed, absent or still waiting for an admin
    #[error("session '{0}' is not active or joined")]
    SessionNotActiveOrJoined(String),

    /// The connection is not bound to the session it addressed
    #[error("connection is not a participant of session '{0}'")]
    NotSessionParticipant(String),

    /// Transition not permitted from the current state
    #[error("cannot {action} session in state {from:?}")]
    InvalidTransition {
        action: &'static str,
        from: SessionState,
    },
}

/// Errors raised while pushing a frame to a connection.
///
/// Delivery failures are never reported to the sender of a chat message;
/// the history log is the recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    /// Recipient is not connected
    #[error("delivery skipped: connection '{0}' is not registered")]
    ClientNotFound(String),

    /// Recipient's outbound buffer is full
    #[error("delivery skipped: outbound buffer of connection '{0}' is full")]
    BufferFull(String),

    /// Recipient's writer task has gone away
    #[error("delivery skipped: connection '{0}' is closed")]
    ChannelClosed(String),
}

/// Errors raised by the transcript archive collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive unavailable: {0}")]
    Unavailable(String),
}
