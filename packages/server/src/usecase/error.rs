//! UseCase 層のエラー型

use thiserror::Error;

use crate::{
    domain::{Role, Sender, SessionError, ValueObjectError},
    infrastructure::dto::websocket::ErrorCode,
};

/// 接続からのコマンド（request_help / admin_join / send_message など）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Payload 内の値が Domain Model として不正
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ValueObjectError),

    #[error("'{event}' is not allowed for role {role:?}")]
    ForbiddenForRole { event: &'static str, role: Role },

    /// `sender` フィールドが接続時のロールと一致しない
    #[error("sender {claimed:?} does not match connection role {role:?}")]
    SenderMismatch { claimed: Sender, role: Role },
}

impl CommandError {
    /// ワイヤーに載せるエラーコード
    pub fn code(&self) -> ErrorCode {
        match self {
            CommandError::Session(e) => ErrorCode::from(e),
            CommandError::InvalidPayload(_) => ErrorCode::MalformedPayload,
            CommandError::ForbiddenForRole { .. } => ErrorCode::ForbiddenForRole,
            CommandError::SenderMismatch { .. } => ErrorCode::NotSessionParticipant,
        }
    }
}

/// 参照系ユースケースのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(#[from] ValueObjectError),

    #[error("session '{0}' not found")]
    SessionNotFound(String),
}
