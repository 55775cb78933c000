//! InMemory Transcript Archive 実装
//!
//! ドメイン層が定義する `TranscriptArchive` trait の具体的な実装。
//! クローズ済みセッションのトランスクリプトを Vec に保持します。
//! 長期保存は外部の永続化層の責務であり、ここでは扱いません。

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ArchiveError, ExternalId, Transcript, TranscriptArchive};

/// インメモリ Transcript Archive 実装
#[derive(Default)]
pub struct InMemoryTranscriptArchive {
    transcripts: Mutex<Vec<Transcript>>,
}

impl InMemoryTranscriptArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みトランスクリプトの件数
    pub async fn count(&self) -> usize {
        self.transcripts.lock().await.len()
    }

    /// 指定セッションの保存済みトランスクリプト（古い順）
    pub async fn find_by_session(&self, session_id: &ExternalId) -> Vec<Transcript> {
        self.transcripts
            .lock()
            .await
            .iter()
            .filter(|t| &t.session.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TranscriptArchive for InMemoryTranscriptArchive {
    async fn archive(&self, transcript: Transcript) -> Result<(), ArchiveError> {
        tracing::debug!(
            session_id = %transcript.session.session_id,
            messages = transcript.messages.len(),
            "Transcript archived in memory"
        );
        self.transcripts.lock().await.push(transcript);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatSession, ConnectionId, Timestamp};

    #[tokio::test]
    async fn test_archive_and_find_by_session() {
        // テスト項目: 保存したトランスクリプトをセッション ID で取得できる
        // given (前提条件):
        let archive = InMemoryTranscriptArchive::new();
        let c1 = ExternalId::new("C1".to_string()).unwrap();
        let c2 = ExternalId::new("C2".to_string()).unwrap();
        for id in [&c1, &c2, &c1] {
            let session = ChatSession::request(id.clone(), ConnectionId::generate(), Timestamp::new(1));
            archive
                .archive(Transcript {
                    session,
                    messages: vec![],
                })
                .await
                .unwrap();
        }

        // when (操作):
        let found = archive.find_by_session(&c1).await;

        // then (期待する結果):
        assert_eq!(archive.count().await, 3);
        assert_eq!(found.len(), 2);
    }
}
