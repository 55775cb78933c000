//! UseCase: admin コンソールの登録

use std::sync::Arc;

use crate::{
    broker::{AdminDispatcher, SharedPendingQueue},
    domain::{Participant, Role},
};

use super::{error::CommandError, require_role};

/// admin コンソール登録のユースケース
pub struct AdminConnectUseCase {
    dispatcher: Arc<AdminDispatcher>,
    queue: Arc<SharedPendingQueue>,
}

impl AdminConnectUseCase {
    pub fn new(dispatcher: Arc<AdminDispatcher>, queue: Arc<SharedPendingQueue>) -> Self {
        Self { dispatcher, queue }
    }

    /// admin を配信先に登録し、現在のキューのスナップショットを送る
    pub async fn execute(&self, participant: &Participant) -> Result<(), CommandError> {
        require_role(participant, Role::Admin, "admin_connect")?;
        self.dispatcher
            .on_admin_connect(participant.connection_id, &self.queue)
            .await;
        Ok(())
    }
}
