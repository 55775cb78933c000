//! Message Relay & History Log.
//!
//! Appends go through the session slot lock, which assigns the sequence
//! number and delivers the frame to both live ends before releasing it.
//! Delivery is best effort: an absent or saturated recipient is skipped and
//! catches up from `history` on its next join or reconnect.

use std::sync::Arc;

use crate::{
    domain::{
        ChatMessage, ConnectionId, ExternalId, MessagePusher, MessageText, Sender, SessionError,
    },
    infrastructure::dto::websocket::ServerEvent,
};

use super::session_registry::SessionRegistry;

pub struct MessageRelay {
    sessions: Arc<SessionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl MessageRelay {
    pub fn new(sessions: Arc<SessionRegistry>, message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            sessions,
            message_pusher,
        }
    }

    /// Append to the log without relaying.
    ///
    /// # Errors
    ///
    /// `SessionNotActiveOrJoined` when the session is absent, closed or still
    /// waiting for an admin.
    pub async fn append(
        &self,
        session_id: &ExternalId,
        sender: Sender,
        text: MessageText,
    ) -> Result<ChatMessage, SessionError> {
        let now = self.sessions.now();
        let mut slot = self
            .sessions
            .lock_slot(session_id)
            .await
            .ok_or_else(|| SessionError::SessionNotActiveOrJoined(session_id.as_str().to_string()))?;
        let (message, _) = slot.append(session_id, sender, text, now)?;
        Ok(message)
    }

    /// Full ordered log of a session
    pub async fn history(&self, session_id: &ExternalId) -> Result<Vec<ChatMessage>, SessionError> {
        self.sessions.history(session_id).await
    }

    /// Deliver an already appended message to whichever ends of the session
    /// are live. Returns the number of connections that accepted it.
    pub async fn broadcast(&self, session_id: &ExternalId, message: &ChatMessage) -> usize {
        let Some(slot) = self.sessions.lock_slot(session_id).await else {
            return 0;
        };
        let targets = slot
            .session()
            .map(|session| session.live_connections())
            .unwrap_or_default();
        self.deliver(&targets, message).await
    }

    /// Append a message from `from` and relay it, atomically with respect to
    /// every other operation on the same session.
    ///
    /// # Errors
    ///
    /// - `SessionNotActiveOrJoined` for absent, waiting or closed sessions
    /// - `NotSessionParticipant` when `from` is not the bound end for `sender`
    pub async fn relay(
        &self,
        from: &ConnectionId,
        session_id: &ExternalId,
        sender: Sender,
        text: MessageText,
    ) -> Result<ChatMessage, SessionError> {
        let now = self.sessions.now();
        let not_active = || SessionError::SessionNotActiveOrJoined(session_id.as_str().to_string());

        let mut slot = self.sessions.lock_slot(session_id).await.ok_or_else(not_active)?;
        let session = slot.session().ok_or_else(not_active)?;
        if !session.state.is_claimed() {
            return Err(not_active());
        }
        let bound = match sender {
            Sender::Citizen => session.citizen_connection_id.as_ref(),
            Sender::Admin => session.admin_connection_id.as_ref(),
        };
        if bound != Some(from) {
            return Err(SessionError::NotSessionParticipant(
                session_id.as_str().to_string(),
            ));
        }

        let (message, activated) = slot.append(session_id, sender, text, now)?;
        if activated {
            tracing::info!(%session_id, "Session activated by first message");
        }
        let targets = slot
            .session()
            .map(|session| session.live_connections())
            .unwrap_or_default();
        let delivered = self.deliver(&targets, &message).await;
        tracing::debug!(
            %session_id,
            sequence = message.sequence,
            ?sender,
            delivered,
            "Message relayed"
        );
        Ok(message)
    }

    async fn deliver(&self, targets: &[ConnectionId], message: &ChatMessage) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let frame = ServerEvent::from(message.clone()).to_frame();
        self.message_pusher.broadcast(targets, &frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::test_support::{TestBroker, TestConnection, id, test_broker},
        config::BrokerConfig,
        domain::SessionState,
    };

    fn text(value: &str) -> MessageText {
        MessageText::new(value.to_string()).unwrap()
    }

    async fn joined_session(t: &TestBroker) -> (TestConnection, TestConnection) {
        let mut citizen = t.open().await;
        let mut admin = t.admin().await;
        t.broker.sessions.create(&id("C1"), citizen.id).await;
        t.broker.sessions.claim(&id("C1"), admin.id).await.unwrap();
        citizen.drain();
        admin.drain();
        (citizen, admin)
    }

    #[tokio::test]
    async fn test_relay_delivers_to_both_participants() {
        // テスト項目: メッセージは citizen と admin の両方に届き、初回で ACTIVE になる
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let (mut citizen, mut admin) = joined_session(&t).await;

        // when (操作):
        let message = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Citizen, text("help"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(message.sequence, 1);
        let to_admin = admin.drain_type("user_message");
        let to_citizen = citizen.drain_type("user_message");
        assert_eq!(to_admin.len(), 1);
        assert_eq!(to_admin[0]["text"], "help");
        assert_eq!(to_citizen.len(), 1);
        let summary = t.broker.sessions.get(&id("C1")).await.unwrap();
        assert_eq!(summary.session.state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_relay_rejects_waiting_and_unknown_sessions() {
        // テスト項目: REQUESTED / 存在しないセッションへの送信は SESSION_NOT_ACTIVE_OR_JOINED
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let citizen = t.open().await;
        t.broker.sessions.create(&id("C1"), citizen.id).await;

        // when (操作):
        let waiting = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Citizen, text("anyone?"))
            .await;
        let unknown = t
            .broker
            .relay
            .relay(&citizen.id, &id("C2"), Sender::Citizen, text("hello"))
            .await;

        // then (期待する結果):
        assert_eq!(
            waiting,
            Err(SessionError::SessionNotActiveOrJoined("C1".to_string()))
        );
        assert_eq!(
            unknown,
            Err(SessionError::SessionNotActiveOrJoined("C2".to_string()))
        );
        assert!(t.broker.relay.history(&id("C1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relay_rejects_non_participant() {
        // テスト項目: セッションに紐づかない接続や送信者の詐称は NOT_SESSION_PARTICIPANT
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let (citizen, _admin) = joined_session(&t).await;
        let other_admin = t.admin().await;

        // when (操作):
        let intruder = t
            .broker
            .relay
            .relay(&other_admin.id, &id("C1"), Sender::Admin, text("hi"))
            .await;
        let spoofed = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Admin, text("hi"))
            .await;

        // then (期待する結果):
        let expected = Err(SessionError::NotSessionParticipant("C1".to_string()));
        assert_eq!(intruder, expected);
        assert_eq!(spoofed, expected);
    }

    #[tokio::test]
    async fn test_relay_after_close_is_rejected() {
        // テスト項目: クローズ後の送信は SESSION_NOT_ACTIVE_OR_JOINED で履歴も変わらない
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let (citizen, admin) = joined_session(&t).await;
        t.broker.sessions.close(&id("C1"), &admin.id).await.unwrap();

        // when (操作):
        let result = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Citizen, text("wait"))
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(SessionError::SessionNotActiveOrJoined("C1".to_string()))
        );
        assert!(t.broker.relay.history(&id("C1")).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_get_a_total_order() {
        // テスト項目: 同時送信でもシーケンス番号は 1 から連番で、配送順と一致する
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let (citizen, mut admin) = joined_session(&t).await;

        // when (操作):
        let mut handles = Vec::new();
        for i in 0..20 {
            let relay = t.broker.relay.clone();
            let (from, sender) = if i % 2 == 0 {
                (citizen.id, Sender::Citizen)
            } else {
                (admin.id, Sender::Admin)
            };
            handles.push(tokio::spawn(async move {
                relay
                    .relay(&from, &id("C1"), sender, text(&format!("m{i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // then (期待する結果):
        let history = t.broker.relay.history(&id("C1")).await.unwrap();
        let sequences: Vec<u64> = history.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
        let delivered: Vec<u64> = admin
            .drain()
            .into_iter()
            .filter(|f| f["type"] == "user_message" || f["type"] == "admin_message")
            .map(|f| f["sequence"].as_u64().unwrap())
            .collect();
        assert_eq!(delivered, sequences);
    }

    #[tokio::test]
    async fn test_full_outbound_buffer_does_not_fail_the_sender() {
        // テスト項目: 受信側のバッファが満杯でも送信は成功し、履歴には残る
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let citizen = t.open().await;
        let admin_id = ConnectionId::generate();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        t.pusher.register_client(admin_id, tx).await;
        t.broker
            .dispatcher
            .on_admin_connect(admin_id, &t.broker.queue)
            .await;
        t.broker.sessions.create(&id("C1"), citizen.id).await;
        t.broker.sessions.claim(&id("C1"), admin_id).await.unwrap();

        // when (操作):
        let first = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Citizen, text("one"))
            .await;
        let second = t
            .broker
            .relay
            .relay(&citizen.id, &id("C1"), Sender::Citizen, text("two"))
            .await;

        // then (期待する結果):
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(t.broker.relay.history(&id("C1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_and_broadcast() {
        // テスト項目: append で履歴に追加し、broadcast で生存中の両端に配送できる
        // given (前提条件):
        let t = test_broker(BrokerConfig::default());
        let (mut citizen, mut admin) = joined_session(&t).await;

        // when (操作):
        let message = t
            .broker
            .relay
            .append(&id("C1"), Sender::Admin, text("hello"))
            .await
            .unwrap();
        let delivered = t.broker.relay.broadcast(&id("C1"), &message).await;

        // then (期待する結果):
        assert_eq!(message.sequence, 1);
        assert_eq!(delivered, 2);
        assert_eq!(citizen.drain_type("admin_message").len(), 1);
        assert_eq!(admin.drain_type("admin_message").len(), 1);
    }
}
