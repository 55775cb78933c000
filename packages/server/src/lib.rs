//! Concierge live support-chat broker.
//!
//! Pairs citizens who ask for help with admin staff over WebSocket: a FIFO
//! pending queue, an exclusive claim per session, an ordered message log and
//! fan-out of queue and session events to every admin console.

// layers
pub mod broker;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
