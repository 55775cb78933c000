//! UseCase 層
//!
//! 接続ハンドラーから呼ばれるアプリケーションロジック。共有状態の変更は
//! すべて broker の契約（Session Registry / Pending Queue）を経由します。

mod admin_connect;
mod close_session;
mod connect_participant;
mod disconnect_participant;
mod error;
mod get_queue;
mod get_session_detail;
mod get_stats;
mod join_session;
mod request_help;
mod send_message;

pub use admin_connect::AdminConnectUseCase;
pub use close_session::CloseSessionUseCase;
pub use connect_participant::ConnectParticipantUseCase;
pub use disconnect_participant::DisconnectParticipantUseCase;
pub use error::{CommandError, QueryError};
pub use get_queue::GetQueueUseCase;
pub use get_session_detail::GetSessionDetailUseCase;
pub use get_stats::{BrokerStats, GetStatsUseCase};
pub use join_session::JoinSessionUseCase;
pub use request_help::RequestHelpUseCase;
pub use send_message::SendMessageUseCase;

use crate::domain::{Participant, Role};

/// ロールの確認
fn require_role(
    participant: &Participant,
    role: Role,
    event: &'static str,
) -> Result<(), CommandError> {
    if participant.role == role {
        Ok(())
    } else {
        Err(CommandError::ForbiddenForRole {
            event,
            role: participant.role,
        })
    }
}
