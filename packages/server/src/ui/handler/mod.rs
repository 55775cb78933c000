//! Request handlers.

mod http;
mod websocket;

pub use http::{get_queue, get_session_detail, get_stats, health_check};
pub use websocket::websocket_handler;
