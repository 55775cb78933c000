//! Concierge support-chat broker server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin concierge-server
//! cargo run --bin concierge-server -- --host 0.0.0.0 --port 3000 --citizen-reconnect-grace-secs 10
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;
use concierge_server::{
    broker::Broker,
    config::{BrokerConfig, DEFAULT_OUTBOUND_BUFFER},
    infrastructure::{
        message_pusher::WebSocketMessagePusher, repository::InMemoryTranscriptArchive,
    },
    ui::{AppState, Server},
};
use concierge_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "concierge-server")]
#[command(about = "Live support-chat broker pairing citizens with admin staff", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Frames buffered per connection before deliveries are skipped
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    outbound_buffer: usize,

    /// Seconds a disconnected citizen may take to reconnect (0 closes at once)
    #[arg(long, default_value_t = 30)]
    citizen_reconnect_grace_secs: u64,

    /// Requeue a claimed session that stays silent this many seconds
    #[arg(long)]
    join_silence_timeout_secs: Option<u64>,

    /// Close a request nobody claims within this many seconds
    #[arg(long)]
    queue_idle_timeout_secs: Option<u64>,

    /// Seconds a closed session stays readable before it is purged
    #[arg(long, default_value_t = 300)]
    closed_retention_secs: u64,

    /// Seconds between timeout policy sweeps
    #[arg(long, default_value_t = 5)]
    sweep_interval_secs: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl Args {
    fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            outbound_buffer: self.outbound_buffer,
            citizen_reconnect_grace: Duration::from_secs(self.citizen_reconnect_grace_secs),
            join_silence_timeout: self.join_silence_timeout_secs.map(Duration::from_secs),
            queue_idle_timeout: self.queue_idle_timeout_secs.map(Duration::from_secs),
            closed_retention: Duration::from_secs(self.closed_retention_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &args.log_level);

    let config = args.broker_config();
    tracing::info!(?config, "Broker configuration");

    // Initialize dependencies in order:
    // 1. MessagePusher
    // 2. TranscriptArchive
    // 3. Broker (queue, sessions, relay, admin dispatch)
    // 4. Policy sweeper
    // 5. Server

    // 1. Create MessagePusher (WebSocket implementation)
    let message_pusher = Arc::new(WebSocketMessagePusher::new());

    // 2. Create TranscriptArchive (in-memory implementation)
    let archive = Arc::new(InMemoryTranscriptArchive::new());

    // 3. Create Broker
    let broker = Broker::new(config, message_pusher, archive, Arc::new(SystemClock));

    // 4. Start the policy sweeper
    let sweeper = Arc::new(broker.sweeper()).spawn(broker.config.sweep_interval);

    // 5. Create and run the server
    let server = Server::new(AppState::new(&broker));
    let result = server.run(args.host, args.port).await;
    sweeper.abort();

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
