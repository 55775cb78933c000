//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};

use crate::{
    domain::{ExternalId, Participant, Role},
    infrastructure::dto::websocket::{ClientEvent, ErrorCode, ServerEvent},
    ui::state::AppState,
    usecase::CommandError,
};

/// Query parameters for WebSocket connection.
///
/// Stands in for the identity provider's handshake output.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub role: Role,
    pub external_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let role = query.role;

    // Convert String -> ExternalId (Domain Model)
    let external_id = match query.external_id {
        Some(raw) => match ExternalId::try_from(raw.clone()) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(?role, "Invalid external_id '{}': {}", raw, e);
                return Err(StatusCode::BAD_REQUEST);
            }
        },
        None if role == Role::Citizen => {
            tracing::warn!("Citizen handshake without external_id");
            return Err(StatusCode::BAD_REQUEST);
        }
        None => None,
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, role, external_id)))
}

/// Spawns a task that receives frames from the rx channel and pushes them to the WebSocket sender.
///
/// The loop ends when the channel closes (the connection was unregistered) or
/// the socket rejects a write.
fn pusher_loop(
    mut rx: mpsc::Receiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    role: Role,
    external_id: Option<ExternalId>,
) {
    let (sender, mut receiver) = socket.split();

    // Bounded outbound channel; a full buffer skips delivery for this connection only
    let (tx, rx) = mpsc::channel(state.outbound_buffer.max(1));

    // Use ConnectParticipantUseCase to register the connection
    let participant = state
        .connect_participant_usecase
        .execute(role, external_id, tx)
        .await;
    let connection_id = participant.connection_id;

    let state_clone = state.clone();

    // Stop signal for the reader; an event already being handled runs to completion
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    // Spawn a task to receive events from this connection
    let mut recv_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                msg = receiver.next() => msg,
                _ = &mut stop_rx => break,
            };
            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    tracing::debug!(%connection_id, "WebSocket error: {}", e);
                    break;
                }
                None => break,
            };

            match msg {
                Message::Text(text) => {
                    handle_text(&state_clone, &participant, text.as_str()).await;
                }
                Message::Binary(_) => {
                    reply_error(
                        &state_clone,
                        &participant,
                        ErrorCode::MalformedPayload,
                        "binary frames are not supported".to_string(),
                    )
                    .await;
                }
                Message::Close(_) => {
                    tracing::info!(%connection_id, "Client requested close");
                    break;
                }
                // Ping/pong is handled automatically by the WebSocket protocol
                _ => {}
            }
        }
    });

    // Spawn a task to push frames from the broker to this connection
    let mut send_task = pusher_loop(rx, sender);

    let reader_finished = tokio::select! {
        _ = &mut recv_task => true,
        _ = &mut send_task => false,
    };
    if reader_finished {
        send_task.abort();
    } else {
        // The writer is gone: let the reader finish its current event, then stop it
        let _ = stop_tx.send(());
        if let Err(e) = recv_task.await {
            tracing::warn!(%connection_id, "Reader task failed: {}", e);
        }
    }

    // Use DisconnectParticipantUseCase to run the session-side transitions
    if state
        .disconnect_participant_usecase
        .execute(&connection_id)
        .await
        .is_none()
    {
        tracing::warn!(%connection_id, "Disconnected connection was not registered");
    }
}

/// Parse one inbound frame and dispatch it to its use case
async fn handle_text(state: &AppState, participant: &Participant, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                connection_id = %participant.connection_id,
                "Malformed payload: {}",
                e
            );
            reply_error(state, participant, ErrorCode::MalformedPayload, e.to_string()).await;
            return;
        }
    };

    let result: Result<(), CommandError> = match event {
        ClientEvent::RequestHelp => state
            .request_help_usecase
            .execute(participant)
            .await
            .map(|_| ()),
        ClientEvent::AdminConnect => state.admin_connect_usecase.execute(participant).await,
        ClientEvent::AdminJoin { session_id } => state
            .join_session_usecase
            .execute(participant, session_id)
            .await
            .map(|_| ()),
        ClientEvent::SendMessage {
            session_id,
            sender,
            text,
        } => state
            .send_message_usecase
            .execute(participant, session_id, sender, text)
            .await
            .map(|_| ()),
        ClientEvent::CloseSession { session_id } => state
            .close_session_usecase
            .execute(participant, session_id)
            .await
            .map(|_| ()),
        ClientEvent::Ping => {
            reply(state, participant, &ServerEvent::Pong).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::info!(
            connection_id = %participant.connection_id,
            role = ?participant.role,
            "Rejected event: {}",
            e
        );
        reply_error(state, participant, e.code(), e.to_string()).await;
    }
}

async fn reply(state: &AppState, participant: &Participant, event: &ServerEvent) {
    // 失敗は pusher 側でログ済み
    let _ = state
        .message_pusher
        .push_to(&participant.connection_id, &event.to_frame())
        .await;
}

async fn reply_error(state: &AppState, participant: &Participant, code: ErrorCode, message: String) {
    reply(state, participant, &ServerEvent::Error { code, message }).await;
}
