//! インメモリ実装

mod transcript;

pub use transcript::InMemoryTranscriptArchive;
