//! Repository 実装
//!
//! - `inmemory`: テストおよびデフォルト構成用のインメモリ実装

pub mod inmemory;

pub use inmemory::InMemoryTranscriptArchive;
