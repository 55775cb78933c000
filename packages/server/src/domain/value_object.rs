//! Value objects for the broker domain.
//!
//! Each type validates its input on construction, so anything holding one
//! can rely on it being well-formed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValueObjectError;

/// Maximum length of an external (identity provider) id
pub const EXTERNAL_ID_MAX_LENGTH: usize = 128;

/// Maximum length of a chat message body in characters
pub const MESSAGE_TEXT_MAX_LENGTH: usize = 4000;

/// Identifier of one live transport connection.
///
/// Generated by the broker at handshake time; never supplied by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Opaque identifier handed over by the identity provider.
///
/// For citizens this doubles as the session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalId(String);

impl ExternalId {
    /// Create a new ExternalId.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is blank, too long or contains control
    /// characters.
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::ExternalIdEmpty);
        }
        if value.chars().count() > EXTERNAL_ID_MAX_LENGTH {
            return Err(ValueObjectError::ExternalIdTooLong(EXTERNAL_ID_MAX_LENGTH));
        }
        if value.chars().any(char::is_control) {
            return Err(ValueObjectError::ExternalIdInvalidCharacter);
        }
        Ok(Self(value))
    }

    /// Id for an admin console that connected without one
    pub fn anonymous_admin(connection_id: &ConnectionId) -> Self {
        Self(format!("admin-{}", connection_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ExternalId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExternalId> for String {
    fn from(value: ExternalId) -> Self {
        value.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText(String);

impl MessageText {
    /// Create a new MessageText.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is blank or longer than
    /// [`MESSAGE_TEXT_MAX_LENGTH`] characters.
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::MessageTextEmpty);
        }
        if value.chars().count() > MESSAGE_TEXT_MAX_LENGTH {
            return Err(ValueObjectError::MessageTextTooLong(MESSAGE_TEXT_MAX_LENGTH));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageText {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed from `self` to `later`, clamped at zero
    pub fn elapsed_until(&self, later: Timestamp) -> i64 {
        (later.0 - self.0).max(0)
    }
}
