//! Integration tests for the support-chat broker over real WebSocket and HTTP.
//!
//! Each test boots the axum server in-process on an ephemeral port.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use concierge_server::{
    broker::Broker,
    config::BrokerConfig,
    infrastructure::{
        message_pusher::WebSocketMessagePusher, repository::InMemoryTranscriptArchive,
    },
    ui::{AppState, Server},
};
use concierge_shared::time::SystemClock;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper struct to manage an in-process server
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(BrokerConfig::default()).await
    }

    async fn start_with(config: BrokerConfig) -> Self {
        let broker = Broker::new(
            config,
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(InMemoryTranscriptArchive::new()),
            Arc::new(SystemClock),
        );
        let server = Server::new(AppState::new(&broker));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = signal.await;
                })
                .await
                .expect("Server error");
        });

        TestServer {
            addr,
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    fn ws_url(&self, role: &str, external_id: &str) -> String {
        format!(
            "ws://{}/ws?role={}&external_id={}",
            self.addr, role, external_id
        )
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get_json(&self, path: &str) -> Value {
        reqwest::get(self.http_url(path))
            .await
            .expect("HTTP request failed")
            .json()
            .await
            .expect("Invalid JSON body")
    }

    /// Poll the queue endpoint until it matches
    async fn wait_for_queue(&self, expected: Value) {
        let deadline = tokio::time::Instant::now() + FRAME_TIMEOUT;
        loop {
            let queue = self.get_json("/api/queue").await;
            if queue["requests"] == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue never became {expected}, last seen {queue}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Helper struct wrapping one WebSocket client
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("Failed to connect");
        let mut client = TestClient { ws };
        client.expect("connected").await;
        client
    }

    async fn send(&mut self, event: Value) {
        self.ws
            .send(Message::Text(event.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    async fn next_frame(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(FRAME_TIMEOUT, self.ws.next())
                .await
                .expect("Timed out waiting for a frame")
                .expect("Stream ended")
                .expect("WebSocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).expect("Invalid JSON frame");
            }
        }
    }

    /// Skip frames until one of type `event_type` arrives
    async fn expect(&mut self, event_type: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == event_type {
                return frame;
            }
        }
    }

    /// Skip frames until a `session_event` with the given event arrives
    async fn expect_session_event(&mut self, event: &str) -> Value {
        loop {
            let frame = self.expect("session_event").await;
            if frame["event"] == event {
                return frame;
            }
        }
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[tokio::test]
async fn test_support_scenario_end_to_end() {
    // テスト項目: 要求 → admin 接続 → claim → 会話 → admin 切断で再キューされる一連の流れ
    // given (前提条件):
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;

    // when (操作): C1 がヘルプを要求する
    c1.send(json!({"type": "request_help"})).await;

    // then (期待する結果): キューは [C1]
    let requested = c1.expect("help_requested").await;
    assert_eq!(requested["session_id"], "C1");
    assert_eq!(requested["state"], "REQUESTED");
    server.wait_for_queue(json!(["C1"])).await;

    // when (操作): A1 が接続してスナップショットを受け取る
    let mut a1 = TestClient::connect(&server.ws_url("admin", "A1")).await;
    a1.send(json!({"type": "admin_connect"})).await;

    // then (期待する結果):
    let snapshot = a1.expect("pending_requests").await;
    assert_eq!(snapshot["requests"], json!(["C1"]));

    // when (操作): A1 が C1 を claim する
    a1.send(json!({"type": "admin_join", "session_id": "C1"})).await;

    // then (期待する結果): 履歴が再送され、キューは空、状態は JOINED
    let history = a1.expect("chat_history").await;
    assert_eq!(history["messages"], json!([]));
    c1.expect_session_event("admin_joined").await;
    server.wait_for_queue(json!([])).await;
    let detail = server.get_json("/api/sessions/C1").await;
    assert_eq!(detail["state"], "JOINED");

    // when (操作): C1 → "hello", A1 → "hi"
    c1.send(json!({"type": "send_message", "session_id": "C1", "sender": "citizen", "text": "hello"}))
        .await;
    let hello = a1.expect("user_message").await;
    a1.send(json!({"type": "send_message", "session_id": "C1", "sender": "admin", "text": "hi"}))
        .await;
    let hi = c1.expect("admin_message").await;

    // then (期待する結果): 採番は 1, 2
    assert_eq!(hello["text"], "hello");
    assert_eq!(hello["sequence"], 1);
    assert_eq!(hi["text"], "hi");
    assert_eq!(hi["sequence"], 2);
    let detail = server.get_json("/api/sessions/C1").await;
    assert_eq!(detail["state"], "ACTIVE");
    assert_eq!(detail["message_count"], 2);

    // when (操作): A1 が切断する
    a1.close().await;

    // then (期待する結果): セッションは REQUESTED に戻り、キューは [C1]
    c1.expect_session_event("admin_left").await;
    server.wait_for_queue(json!(["C1"])).await;
    let detail = server.get_json("/api/sessions/C1").await;
    assert_eq!(detail["state"], "REQUESTED");
    assert_eq!(detail["admin_connection_id"], Value::Null);
}

#[tokio::test]
async fn test_concurrent_admin_join_has_one_winner() {
    // テスト項目: 2 人の admin が同時に claim すると 1 人だけ成功し、他方は ALREADY_CLAIMED
    // given (前提条件):
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;
    c1.send(json!({"type": "request_help"})).await;
    c1.expect("help_requested").await;
    let mut a1 = TestClient::connect(&server.ws_url("admin", "A1")).await;
    let mut a2 = TestClient::connect(&server.ws_url("admin", "A2")).await;

    // when (操作):
    let join = json!({"type": "admin_join", "session_id": "C1"});
    tokio::join!(a1.send(join.clone()), a2.send(join.clone()));

    // then (期待する結果):
    async fn outcome(client: &mut TestClient) -> Value {
        loop {
            let frame = client.next_frame().await;
            if frame["type"] == "chat_history" || frame["type"] == "error" {
                return frame;
            }
        }
    }
    let (r1, r2) = tokio::join!(outcome(&mut a1), outcome(&mut a2));
    let results = [r1, r2];
    let winners = results
        .iter()
        .filter(|f| f["type"] == "chat_history")
        .count();
    let losers: Vec<_> = results.iter().filter(|f| f["type"] == "error").collect();
    assert_eq!(winners, 1);
    assert_eq!(losers.len(), 1);
    assert_eq!(losers[0]["code"], "ALREADY_CLAIMED");
}

#[tokio::test]
async fn test_citizen_reconnect_replays_history() {
    // テスト項目: citizen が再接続すると同じセッションに戻り、それまでの履歴が再送される
    // given (前提条件):
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;
    c1.send(json!({"type": "request_help"})).await;
    c1.expect("help_requested").await;
    let mut a1 = TestClient::connect(&server.ws_url("admin", "A1")).await;
    a1.send(json!({"type": "admin_connect"})).await;
    a1.send(json!({"type": "admin_join", "session_id": "C1"})).await;
    a1.expect("chat_history").await;
    c1.send(json!({"type": "send_message", "session_id": "C1", "sender": "citizen", "text": "my card was charged twice"}))
        .await;
    a1.expect("user_message").await;

    // when (操作):
    c1.close().await;
    a1.expect_session_event("citizen_disconnected").await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;

    // then (期待する結果):
    let requested = c1.expect("help_requested").await;
    assert_eq!(requested["state"], "ACTIVE");
    let history = c1.expect("chat_history").await;
    assert_eq!(history["messages"][0]["text"], "my card was charged twice");
    assert_eq!(history["messages"][0]["sequence"], 1);
    a1.expect_session_event("citizen_reconnected").await;

    // 再接続後も会話を続けられる
    c1.send(json!({"type": "send_message", "session_id": "C1", "sender": "citizen", "text": "still there?"}))
        .await;
    let next = a1.expect("user_message").await;
    assert_eq!(next["sequence"], 2);
}

#[tokio::test]
async fn test_protocol_errors_are_reported_to_sender() {
    // テスト項目: 不正な Payload やロール違反はエラーコード付きで送信元にのみ返される
    // given (前提条件):
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;

    // when (操作) / then (期待する結果):
    c1.send_raw("not json").await;
    assert_eq!(c1.expect("error").await["code"], "MALFORMED_PAYLOAD");

    c1.send(json!({"type": "admin_join", "session_id": "C1"})).await;
    assert_eq!(c1.expect("error").await["code"], "FORBIDDEN_FOR_ROLE");

    c1.send(json!({"type": "send_message", "session_id": "C1", "sender": "citizen", "text": "hello"}))
        .await;
    assert_eq!(
        c1.expect("error").await["code"],
        "SESSION_NOT_ACTIVE_OR_JOINED"
    );

    c1.send(json!({"type": "ping"})).await;
    c1.expect("pong").await;
}

#[tokio::test]
async fn test_handshake_validation() {
    // テスト項目: external_id の無い citizen や不正なロールはアップグレード前に拒否される
    // given (前提条件):
    let server = TestServer::start().await;

    // when (操作):
    let missing_id = connect_async(format!("ws://{}/ws?role=citizen", server.addr)).await;
    let bad_role = connect_async(server.ws_url("operator", "X1")).await;
    let anonymous_admin = connect_async(format!("ws://{}/ws?role=admin", server.addr)).await;

    // then (期待する結果):
    assert!(missing_id.is_err());
    assert!(bad_role.is_err());
    assert!(anonymous_admin.is_ok());
}

#[tokio::test]
async fn test_http_surface() {
    // テスト項目: ヘルスチェック・セッション詳細・統計の HTTP エンドポイント
    // given (前提条件):
    let server = TestServer::start().await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;
    c1.send(json!({"type": "request_help"})).await;
    c1.expect("help_requested").await;

    // when (操作):
    let health = server.get_json("/api/health").await;
    let stats = server.get_json("/api/stats").await;
    let missing = reqwest::get(server.http_url("/api/sessions/nobody"))
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health, json!({"status": "ok"}));
    assert_eq!(stats["connections"], 1);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["requested"], 1);
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zero_grace_closes_session_on_citizen_drop() {
    // テスト項目: 再接続猶予 0 の設定では citizen 切断で即クローズされ admin に通知される
    // given (前提条件):
    let server = TestServer::start_with(BrokerConfig {
        citizen_reconnect_grace: Duration::ZERO,
        ..BrokerConfig::default()
    })
    .await;
    let mut c1 = TestClient::connect(&server.ws_url("citizen", "C1")).await;
    c1.send(json!({"type": "request_help"})).await;
    c1.expect("help_requested").await;
    let mut a1 = TestClient::connect(&server.ws_url("admin", "A1")).await;
    a1.send(json!({"type": "admin_join", "session_id": "C1"})).await;
    a1.expect("chat_history").await;

    // when (操作):
    c1.close().await;

    // then (期待する結果):
    a1.expect_session_event("citizen_left").await;
    let detail = server.get_json("/api/sessions/C1").await;
    assert_eq!(detail["state"], "CLOSED");
}
