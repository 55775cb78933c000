//! Conversions between domain types and DTOs.

use concierge_shared::time::timestamp_to_rfc3339;

use crate::{
    broker::SessionSummary,
    domain::{ChatMessage, Sender, SessionError},
};

use super::{
    http::SessionSummaryDto,
    websocket::{ChatMessageDto, ErrorCode, ServerEvent},
};

impl From<ChatMessage> for ChatMessageDto {
    fn from(message: ChatMessage) -> Self {
        Self {
            session_id: message.session_id.into_string(),
            sender: message.sender,
            text: message.text.into_string(),
            timestamp: message.timestamp.value(),
            sequence: message.sequence,
        }
    }
}

/// Citizen messages go out as `user_message`, admin messages as `admin_message`
impl From<ChatMessage> for ServerEvent {
    fn from(message: ChatMessage) -> Self {
        match message.sender {
            Sender::Citizen => ServerEvent::UserMessage(message.into()),
            Sender::Admin => ServerEvent::AdminMessage(message.into()),
        }
    }
}

impl From<&SessionError> for ErrorCode {
    fn from(error: &SessionError) -> Self {
        match error {
            SessionError::AlreadyClaimed(_) => ErrorCode::AlreadyClaimed,
            SessionError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            SessionError::SessionNotActiveOrJoined(_) => ErrorCode::SessionNotActiveOrJoined,
            SessionError::NotSessionParticipant(_) => ErrorCode::NotSessionParticipant,
            SessionError::InvalidTransition { .. } => ErrorCode::SessionNotActiveOrJoined,
        }
    }
}

impl From<SessionSummary> for SessionSummaryDto {
    fn from(summary: SessionSummary) -> Self {
        let session = summary.session;
        Self {
            citizen_connected: session.is_citizen_attached(),
            admin_connection_id: session.admin_connection_id.map(|id| id.to_string()),
            message_count: summary.message_count,
            created_at: timestamp_to_rfc3339(session.created_at.value()),
            state_changed_at: timestamp_to_rfc3339(session.state_changed_at.value()),
            state: session.state,
            session_id: session.session_id.into_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ChatSession, ConnectionId, ExternalId, MessageText, SessionState, Timestamp,
    };

    fn message(sender: Sender) -> ChatMessage {
        ChatMessage {
            session_id: ExternalId::new("C1".to_string()).unwrap(),
            sender,
            text: MessageText::new("hello".to_string()).unwrap(),
            timestamp: Timestamp::new(1_700_000_000_000),
            sequence: 3,
        }
    }

    #[test]
    fn test_chat_message_to_server_event_by_sender() {
        // テスト項目: 送信者に応じて user_message / admin_message に変換される
        // given (前提条件):
        let from_citizen = message(Sender::Citizen);
        let from_admin = message(Sender::Admin);

        // when (操作):
        let citizen_frame: serde_json::Value =
            serde_json::from_str(&ServerEvent::from(from_citizen).to_frame()).unwrap();
        let admin_frame: serde_json::Value =
            serde_json::from_str(&ServerEvent::from(from_admin).to_frame()).unwrap();

        // then (期待する結果):
        assert_eq!(citizen_frame["type"], "user_message");
        assert_eq!(citizen_frame["sender"], "citizen");
        assert_eq!(citizen_frame["sequence"], 3);
        assert_eq!(citizen_frame["text"], "hello");
        assert_eq!(admin_frame["type"], "admin_message");
        assert_eq!(admin_frame["sender"], "admin");
    }

    #[test]
    fn test_session_error_to_error_code() {
        // テスト項目: SessionError が対応するエラーコードに変換される
        // given (前提条件):
        let cases = [
            (
                SessionError::AlreadyClaimed("C1".to_string()),
                ErrorCode::AlreadyClaimed,
            ),
            (
                SessionError::SessionNotFound("C1".to_string()),
                ErrorCode::SessionNotFound,
            ),
            (
                SessionError::NotSessionParticipant("C1".to_string()),
                ErrorCode::NotSessionParticipant,
            ),
            (
                SessionError::InvalidTransition {
                    action: "close",
                    from: SessionState::Requested,
                },
                ErrorCode::SessionNotActiveOrJoined,
            ),
        ];

        // when (操作) / then (期待する結果):
        for (error, expected) in cases {
            assert_eq!(ErrorCode::from(&error), expected);
        }
    }

    #[test]
    fn test_session_summary_to_dto() {
        // テスト項目: SessionSummary が HTTP 用 DTO に変換される
        // given (前提条件):
        let admin = ConnectionId::generate();
        let mut session = ChatSession::request(
            ExternalId::new("C1".to_string()).unwrap(),
            ConnectionId::generate(),
            Timestamp::new(0),
        );
        session.claim(admin, Timestamp::new(1_000)).unwrap();
        let summary = SessionSummary {
            session,
            message_count: 2,
        };

        // when (操作):
        let dto = SessionSummaryDto::from(summary);

        // then (期待する結果):
        assert_eq!(dto.session_id, "C1");
        assert_eq!(dto.state, SessionState::Joined);
        assert!(dto.citizen_connected);
        assert_eq!(dto.admin_connection_id, Some(admin.to_string()));
        assert_eq!(dto.message_count, 2);
        assert_eq!(dto.created_at, "1970-01-01T00:00:00+00:00");
        assert_eq!(dto.state_changed_at, "1970-01-01T00:00:01+00:00");
    }
}
