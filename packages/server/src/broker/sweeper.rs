//! Background sweeper for the optional timeout policies.
//!
//! Periodically walks every session and applies reconnect-grace expiry,
//! silent-claim release, queue idle timeout and closed-session purging.
//! Each action re-validates the session under its own slot lock.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::session_registry::{PolicyAction, SessionRegistry};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub grace_expired: usize,
    pub silent_claims_released: usize,
    pub queue_timeouts: usize,
    pub purged: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct PolicySweeper {
    sessions: Arc<SessionRegistry>,
}

impl PolicySweeper {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for session_id in self.sessions.session_ids().await {
            match self.sessions.apply_policies(&session_id).await {
                Some(PolicyAction::CitizenGraceExpired) => report.grace_expired += 1,
                Some(PolicyAction::SilentClaimReleased) => report.silent_claims_released += 1,
                Some(PolicyAction::QueueTimeout) => report.queue_timeouts += 1,
                Some(PolicyAction::Purged) => report.purged += 1,
                None => {}
            }
        }
        report
    }

    /// Run `sweep_once` every `interval` until the task is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.sweep_once().await;
                if !report.is_empty() {
                    tracing::info!(?report, "Policy sweep applied");
                }
            }
        })
    }
}
