//! Server state shared by all handlers.

use std::sync::Arc;

use crate::{
    broker::Broker,
    domain::MessagePusher,
    usecase::{
        AdminConnectUseCase, CloseSessionUseCase, ConnectParticipantUseCase,
        DisconnectParticipantUseCase, GetQueueUseCase, GetSessionDetailUseCase, GetStatsUseCase,
        JoinSessionUseCase, RequestHelpUseCase, SendMessageUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// Frames buffered per connection
    pub outbound_buffer: usize,
    /// MessagePusher（エラー / pong の返信用）
    pub message_pusher: Arc<dyn MessagePusher>,
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    pub request_help_usecase: Arc<RequestHelpUseCase>,
    pub admin_connect_usecase: Arc<AdminConnectUseCase>,
    pub join_session_usecase: Arc<JoinSessionUseCase>,
    pub send_message_usecase: Arc<SendMessageUseCase>,
    pub close_session_usecase: Arc<CloseSessionUseCase>,
    pub get_queue_usecase: Arc<GetQueueUseCase>,
    pub get_session_detail_usecase: Arc<GetSessionDetailUseCase>,
    pub get_stats_usecase: Arc<GetStatsUseCase>,
}

impl AppState {
    /// Wire every use case to the broker's components
    pub fn new(broker: &Broker) -> Self {
        Self {
            outbound_buffer: broker.config.outbound_buffer,
            message_pusher: broker.message_pusher.clone(),
            connect_participant_usecase: Arc::new(ConnectParticipantUseCase::new(
                broker.connections.clone(),
                broker.sessions.clone(),
                broker.message_pusher.clone(),
            )),
            disconnect_participant_usecase: Arc::new(DisconnectParticipantUseCase::new(
                broker.connections.clone(),
                broker.sessions.clone(),
                broker.dispatcher.clone(),
                broker.message_pusher.clone(),
            )),
            request_help_usecase: Arc::new(RequestHelpUseCase::new(broker.sessions.clone())),
            admin_connect_usecase: Arc::new(AdminConnectUseCase::new(
                broker.dispatcher.clone(),
                broker.queue.clone(),
            )),
            join_session_usecase: Arc::new(JoinSessionUseCase::new(broker.sessions.clone())),
            send_message_usecase: Arc::new(SendMessageUseCase::new(broker.relay.clone())),
            close_session_usecase: Arc::new(CloseSessionUseCase::new(broker.sessions.clone())),
            get_queue_usecase: Arc::new(GetQueueUseCase::new(broker.queue.clone())),
            get_session_detail_usecase: Arc::new(GetSessionDetailUseCase::new(
                broker.sessions.clone(),
            )),
            get_stats_usecase: Arc::new(GetStatsUseCase::new(
                broker.connections.clone(),
                broker.dispatcher.clone(),
                broker.queue.clone(),
                broker.sessions.clone(),
            )),
        }
    }
}
