//! Data Transfer Objects (DTOs) for the broker.
//!
//! DTOs are organized by protocol:
//! - `websocket`: duplex wire events
//! - `http`: read-only HTTP API responses

pub mod conversion;
pub mod http;
pub mod websocket;
