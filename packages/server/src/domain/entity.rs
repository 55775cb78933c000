//! Domain entities: participants, chat sessions and messages.
//!
//! `ChatSession` is a pure state machine. It never touches locks or I/O;
//! the session registry serializes calls into it per session key.

use serde::{Deserialize, Serialize};

use super::{
    error::SessionError,
    value_object::{ConnectionId, ExternalId, MessageText, Timestamp},
};

/// Role assigned by the identity provider at handshake time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Citizen,
    Admin,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Citizen,
    Admin,
}

impl From<Role> for Sender {
    fn from(role: Role) -> Self {
        match role {
            Role::Citizen => Sender::Citizen,
            Role::Admin => Sender::Admin,
        }
    }
}

/// One live transport connection and who is behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub external_id: ExternalId,
    pub connected_at: Timestamp,
}

impl Participant {
    pub fn new(
        connection_id: ConnectionId,
        role: Role,
        external_id: ExternalId,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            connection_id,
            role,
            external_id,
            connected_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Lifecycle state of a chat session.
///
/// `Joined` is the window between a claim and the first message; it behaves
/// like `Active` except that a silent claim may be handed back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Requested,
    Joined,
    Active,
    Closed,
}

impl SessionState {
    pub fn is_claimed(&self) -> bool {
        matches!(self, SessionState::Joined | SessionState::Active)
    }
}

/// What happened to a session when its admin went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDropOutcome {
    /// Citizen still attached; back in the queue
    Requeued,
    /// Citizen was gone too
    Closed,
}

/// Citizen ↔ admin pairing, keyed by the citizen's external id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSession {
    pub session_id: ExternalId,
    /// `None` while the citizen is detached and inside the reconnect grace window
    pub citizen_connection_id: Option<ConnectionId>,
    pub admin_connection_id: Option<ConnectionId>,
    pub state: SessionState,
    pub created_at: Timestamp,
    pub state_changed_at: Timestamp,
    pub citizen_detached_at: Option<Timestamp>,
}

impl ChatSession {
    /// Open a new session in `Requested`
    pub fn request(
        session_id: ExternalId,
        citizen_connection_id: ConnectionId,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id,
            citizen_connection_id: Some(citizen_connection_id),
            admin_connection_id: None,
            state: SessionState::Requested,
            created_at: now,
            state_changed_at: now,
            citizen_detached_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed
    }

    pub fn is_citizen_attached(&self) -> bool {
        self.citizen_connection_id.is_some()
    }

    /// Whether `connection_id` is one of the two live ends of this session
    pub fn is_bound_to(&self, connection_id: &ConnectionId) -> bool {
        self.citizen_connection_id.as_ref() == Some(connection_id)
            || self.admin_connection_id.as_ref() == Some(connection_id)
    }

    /// Live connections of this session, citizen first
    pub fn live_connections(&self) -> Vec<ConnectionId> {
        self.citizen_connection_id
            .into_iter()
            .chain(self.admin_connection_id)
            .collect()
    }

    fn transition(&mut self, to: SessionState, now: Timestamp) {
        self.state = to;
        self.state_changed_at = now;
    }

    /// `Requested` → `Joined`, binding the admin exclusively.
    ///
    /// # Errors
    ///
    /// `AlreadyClaimed` if another admin holds the session, `SessionNotFound`
    /// if it is already closed.
    pub fn claim(&mut self, admin: ConnectionId, now: Timestamp) -> Result<(), SessionError> {
        match self.state {
            SessionState::Requested if self.admin_connection_id.is_none() => {
                self.admin_connection_id = Some(admin);
                self.transition(SessionState::Joined, now);
                Ok(())
            }
            SessionState::Closed => Err(SessionError::SessionNotFound(
                self.session_id.as_str().to_string(),
            )),
            _ => Err(SessionError::AlreadyClaimed(
                self.session_id.as_str().to_string(),
            )),
        }
    }

    /// `Joined` → `Active` on the first message. Already active is a no-op.
    ///
    /// Returns `true` when the state changed.
    pub fn activate(&mut self, now: Timestamp) -> Result<bool, SessionError> {
        match self.state {
            SessionState::Joined => {
                self.transition(SessionState::Active, now);
                Ok(true)
            }
            SessionState::Active => Ok(false),
            SessionState::Requested | SessionState::Closed => Err(
                SessionError::SessionNotActiveOrJoined(self.session_id.as_str().to_string()),
            ),
        }
    }

    /// Any state → `Closed`. Returns the admin that was bound, if any.
    pub fn disconnect_citizen(&mut self, now: Timestamp) -> Option<ConnectionId> {
        self.citizen_connection_id = None;
        self.citizen_detached_at = None;
        let admin = self.admin_connection_id.take();
        if self.state != SessionState::Closed {
            self.transition(SessionState::Closed, now);
        }
        admin
    }

    /// `Joined`/`Active` → `Requested`, or `Closed` when the citizen is
    /// detached as well.
    pub fn disconnect_admin(&mut self, now: Timestamp) -> Result<AdminDropOutcome, SessionError> {
        if !self.state.is_claimed() {
            return Err(SessionError::InvalidTransition {
                action: "release admin from",
                from: self.state,
            });
        }
        self.admin_connection_id = None;
        if self.is_citizen_attached() {
            self.transition(SessionState::Requested, now);
            Ok(AdminDropOutcome::Requeued)
        } else {
            self.citizen_detached_at = None;
            self.transition(SessionState::Closed, now);
            Ok(AdminDropOutcome::Closed)
        }
    }

    /// Silent claim timed out: `Joined` → `Requested`.
    pub fn release_silent_claim(&mut self, now: Timestamp) -> Result<ConnectionId, SessionError> {
        match (self.state, self.admin_connection_id) {
            (SessionState::Joined, Some(admin)) => {
                self.admin_connection_id = None;
                self.transition(SessionState::Requested, now);
                Ok(admin)
            }
            (from, _) => Err(SessionError::InvalidTransition {
                action: "release silent claim of",
                from,
            }),
        }
    }

    /// Explicit admin close: `Joined`/`Active` → `Closed`.
    pub fn close(&mut self, now: Timestamp) -> Result<(), SessionError> {
        if !self.state.is_claimed() {
            return Err(SessionError::InvalidTransition {
                action: "close",
                from: self.state,
            });
        }
        self.admin_connection_id = None;
        self.citizen_connection_id = None;
        self.citizen_detached_at = None;
        self.transition(SessionState::Closed, now);
        Ok(())
    }

    /// Queue idle timeout: `Requested` → `Closed`.
    pub fn abandon(&mut self, now: Timestamp) -> Result<(), SessionError> {
        if self.state != SessionState::Requested {
            return Err(SessionError::InvalidTransition {
                action: "abandon",
                from: self.state,
            });
        }
        self.citizen_connection_id = None;
        self.citizen_detached_at = None;
        self.transition(SessionState::Closed, now);
        Ok(())
    }

    /// Detach the citizen's transport. Ignored when `connection_id` is not the
    /// one currently bound (a superseded connection closing late).
    pub fn detach_citizen(&mut self, connection_id: &ConnectionId, now: Timestamp) -> bool {
        if self.citizen_connection_id.as_ref() != Some(connection_id) || !self.is_open() {
            return false;
        }
        self.citizen_connection_id = None;
        self.citizen_detached_at = Some(now);
        true
    }

    /// Bind a (new) citizen connection to this open session
    pub fn reattach_citizen(&mut self, connection_id: ConnectionId) {
        self.citizen_connection_id = Some(connection_id);
        self.citizen_detached_at = None;
    }
}

/// One entry in a session's history log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub session_id: ExternalId,
    pub sender: Sender,
    pub text: MessageText,
    pub timestamp: Timestamp,
    /// Broker-assigned, strictly increasing per session, starting at 1
    pub sequence: u64,
}

/// Session lifecycle notification fanned out to admin consoles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    AdminJoined,
    AdminLeft,
    CitizenDisconnected,
    CitizenReconnected,
    CitizenLeft,
    Requeued,
    Closed,
}

/// Closed session handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}
