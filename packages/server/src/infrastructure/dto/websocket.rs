//! WebSocket wire events.
//!
//! Every frame is a JSON object tagged by `"type"` with snake_case names.

use serde::{Deserialize, Serialize};

use crate::domain::{Role, Sender, SessionEvent, SessionState};

// =============================================================================
// Client-to-Broker Events
// =============================================================================

/// Events sent from a citizen or admin console to the broker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Citizen asks for live help (identity comes from the handshake)
    RequestHelp,

    /// Admin console asks for the current queue snapshot
    AdminConnect,

    /// Admin attempts to claim a pending session
    AdminJoin { session_id: String },

    /// Either side appends a message to a session
    SendMessage {
        session_id: String,
        sender: Sender,
        text: String,
    },

    /// Admin closes a session it holds
    CloseSession { session_id: String },

    /// Keepalive
    Ping,
}

// =============================================================================
// Broker-to-Client Events
// =============================================================================

/// Events sent from the broker to connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake accepted
    Connected {
        connection_id: String,
        role: Role,
        external_id: String,
    },

    /// Citizen's session exists and is waiting (or already claimed)
    HelpRequested {
        session_id: String,
        state: SessionState,
    },

    /// Full pending queue snapshot
    PendingRequests { requests: Vec<String> },

    /// Queue grew by one
    NewRequest { citizen_id: String },

    /// Message log replay
    ChatHistory {
        session_id: String,
        messages: Vec<ChatMessageDto>,
    },

    /// Message authored by the citizen
    UserMessage(ChatMessageDto),

    /// Message authored by the admin
    AdminMessage(ChatMessageDto),

    /// Session lifecycle notification
    SessionEvent {
        session_id: String,
        event: SessionEvent,
    },

    /// Rejection of the last inbound event
    Error { code: ErrorCode, message: String },

    /// Keepalive reply
    Pong,
}

impl ServerEvent {
    /// Serialize to a text frame
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize server event: {}", e);
            r#"{"type":"error","code":"MALFORMED_PAYLOAD","message":"internal serialization failure"}"#
                .to_string()
        })
    }
}

/// Chat message as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageDto {
    pub session_id: String,
    pub sender: Sender,
    pub text: String,
    /// Unix milliseconds
    pub timestamp: i64,
    pub sequence: u64,
}

/// Wire error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AlreadyClaimed,
    SessionNotFound,
    SessionNotActiveOrJoined,
    NotSessionParticipant,
    ForbiddenForRole,
    MalformedPayload,
}
