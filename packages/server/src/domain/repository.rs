//! Repository trait 定義
//!
//! 永続化層（外部コラボレーター）へのインターフェース。
//! ブローカーはセッションが開いている間はメモリ上のログを正とし、
//! クローズ時にのみトランスクリプトを引き渡します。

use async_trait::async_trait;

use super::{entity::Transcript, error::ArchiveError};

/// Durable store for closed session transcripts.
///
/// Failures never block or roll back a close.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    /// Store the transcript of a closed session
    async fn archive(&self, transcript: Transcript) -> Result<(), ArchiveError>;
}
