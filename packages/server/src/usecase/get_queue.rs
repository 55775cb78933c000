//! UseCase: 待機キューの取得

use std::sync::Arc;

use crate::{broker::SharedPendingQueue, domain::ExternalId};

/// 待機キュー取得のユースケース
pub struct GetQueueUseCase {
    queue: Arc<SharedPendingQueue>,
}

impl GetQueueUseCase {
    pub fn new(queue: Arc<SharedPendingQueue>) -> Self {
        Self { queue }
    }

    /// 先頭から順に並んだ citizen の外部 ID
    pub async fn execute(&self) -> Vec<ExternalId> {
        self.queue.snapshot().await
    }
}
