//! Utilities shared by the Concierge packages: logging setup and time handling.

pub mod logger;
pub mod time;
