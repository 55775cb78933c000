//! Session Registry.
//!
//! Authoritative owner of every [`ChatSession`] and its history log.
//!
//! ## Locking
//!
//! Each session key owns a slot behind its own `Mutex`. The map lock is held
//! only to look a slot up or insert one, so a busy session never stalls the
//! others. Within a slot every transition, queue mutation, sequence
//! assignment and notification happens under the slot lock, which gives a
//! single-writer order per session.
//!
//! A transition takes every lock it needs before touching any state, then
//! changes the session, the claims index and the queue with no await in
//! between. A caller dropped mid-transition therefore leaves either the
//! old state or the new one, and at worst misses some notifications.
//!
//! Lock order is always: slot → claims → pending queue → admin set.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use concierge_shared::time::Clock;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    config::BrokerConfig,
    domain::{
        AdminDropOutcome, ChatMessage, ChatSession, ConnectionId, ExternalId, MessagePusher,
        MessageText, Sender, SessionError, SessionEvent, SessionState, Timestamp, Transcript,
        TranscriptArchive,
    },
    infrastructure::dto::websocket::ServerEvent,
};

use super::{admin_dispatch::AdminDispatcher, pending_queue::SharedPendingQueue};

type ClaimIndex = HashMap<ConnectionId, HashSet<ExternalId>>;

/// Per-session state guarded by the slot lock
#[derive(Debug, Default)]
pub struct SessionSlot {
    session: Option<ChatSession>,
    history: Vec<ChatMessage>,
    next_sequence: u64,
    /// Set when the slot has been purged from the map; holders must retry
    retired: bool,
}

impl SessionSlot {
    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn reset(&mut self, session: ChatSession) {
        self.session = Some(session);
        self.history.clear();
        self.next_sequence = 1;
    }

    /// Append a message, activating a `Joined` session on the way.
    ///
    /// The sequence number is assigned here, under the slot lock, so it
    /// always equals append order.
    pub fn append(
        &mut self,
        session_id: &ExternalId,
        sender: Sender,
        text: MessageText,
        now: Timestamp,
    ) -> Result<(ChatMessage, bool), SessionError> {
        let session = self.session.as_mut().ok_or_else(|| {
            SessionError::SessionNotActiveOrJoined(session_id.as_str().to_string())
        })?;
        let activated = session.activate(now)?;

        let message = ChatMessage {
            session_id: session.session_id.clone(),
            sender,
            text,
            timestamp: now,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.history.push(message.clone());
        Ok((message, activated))
    }

    fn transcript(&self) -> Option<Transcript> {
        self.session.as_ref().map(|session| Transcript {
            session: session.clone(),
            messages: self.history.clone(),
        })
    }
}

/// Read-only view of one session for the HTTP surface and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session: ChatSession,
    pub message_count: usize,
}

/// Session counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub requested: usize,
    pub joined: usize,
    pub active: usize,
    pub closed: usize,
}

/// Result of a `request_help`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new session was opened and queued
    Created(ChatSession),
    /// An open session already existed and the connection was (re)bound to it
    Attached(ChatSession),
}

impl RequestOutcome {
    pub fn session(&self) -> &ChatSession {
        match self {
            RequestOutcome::Created(session) | RequestOutcome::Attached(session) => session,
        }
    }
}

/// What a policy sweep did to one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Detached citizen never came back
    CitizenGraceExpired,
    /// Claimed but silent session handed back to the queue
    SilentClaimReleased,
    /// Nobody picked the request up in time
    QueueTimeout,
    /// Closed session dropped from memory
    Purged,
}

pub struct SessionRegistry {
    slots: RwLock<HashMap<ExternalId, Arc<Mutex<SessionSlot>>>>,
    /// Admin connection → session keys it currently holds
    claims: Mutex<ClaimIndex>,
    queue: Arc<SharedPendingQueue>,
    dispatcher: Arc<AdminDispatcher>,
    message_pusher: Arc<dyn MessagePusher>,
    archive: Arc<dyn TranscriptArchive>,
    clock: Arc<dyn Clock>,
    config: BrokerConfig,
}

impl SessionRegistry {
    pub fn new(
        queue: Arc<SharedPendingQueue>,
        dispatcher: Arc<AdminDispatcher>,
        message_pusher: Arc<dyn MessagePusher>,
        archive: Arc<dyn TranscriptArchive>,
        clock: Arc<dyn Clock>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            claims: Mutex::new(HashMap::new()),
            queue,
            dispatcher,
            message_pusher,
            archive,
            clock,
            config,
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    // ========================================
    // Slot access
    // ========================================

    /// Lock the slot of an existing session key
    pub(crate) async fn lock_slot(
        &self,
        session_id: &ExternalId,
    ) -> Option<OwnedMutexGuard<SessionSlot>> {
        loop {
            let slot = self.slots.read().await.get(session_id).cloned()?;
            let guard = slot.lock_owned().await;
            if !guard.retired {
                return Some(guard);
            }
        }
    }

    async fn lock_or_insert_slot(&self, session_id: &ExternalId) -> OwnedMutexGuard<SessionSlot> {
        loop {
            let slot = {
                let mut slots = self.slots.write().await;
                slots
                    .entry(session_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(SessionSlot::default())))
                    .clone()
            };
            let guard = slot.lock_owned().await;
            if !guard.retired {
                return guard;
            }
        }
    }

    pub async fn session_ids(&self) -> Vec<ExternalId> {
        self.slots.read().await.keys().cloned().collect()
    }

    // ========================================
    // Notifications (called under the slot lock)
    // ========================================

    async fn push(&self, connection_id: &ConnectionId, event: &ServerEvent) {
        // 失敗は DELIVERY_SKIPPED として pusher 側でログ済み
        let _ = self
            .message_pusher
            .push_to(connection_id, &event.to_frame())
            .await;
    }

    async fn notify_citizen(&self, session: &ChatSession, event: SessionEvent) {
        if let Some(citizen) = session.citizen_connection_id {
            self.push(
                &citizen,
                &ServerEvent::SessionEvent {
                    session_id: session.session_id.as_str().to_string(),
                    event,
                },
            )
            .await;
        }
    }

    async fn replay_history(&self, connection_id: &ConnectionId, slot: &SessionSlot) {
        if let Some(session) = slot.session() {
            self.push(
                connection_id,
                &ServerEvent::ChatHistory {
                    session_id: session.session_id.as_str().to_string(),
                    messages: slot.history.iter().cloned().map(Into::into).collect(),
                },
            )
            .await;
        }
    }

    /// Store a closed session's transcript. Runs on its own task so the
    /// write completes even if the caller is dropped.
    async fn archive_transcript(&self, transcript: Option<Transcript>) {
        let Some(transcript) = transcript else {
            return;
        };
        let session_id = transcript.session.session_id.clone();
        let archive = Arc::clone(&self.archive);
        match tokio::spawn(async move { archive.archive(transcript).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%session_id, "Failed to archive transcript: {}", e),
            Err(e) => tracing::warn!(%session_id, "Archive task failed: {}", e),
        }
    }

    // ========================================
    // Transitions
    // ========================================

    /// `create`: absent (or closed) → `REQUESTED` and enqueue. An open
    /// session for the same citizen is reattached instead of duplicated.
    pub async fn create(
        &self,
        citizen_id: &ExternalId,
        citizen_connection: ConnectionId,
    ) -> RequestOutcome {
        let now = self.now();
        let mut slot = self.lock_or_insert_slot(citizen_id).await;

        if let Some(session) = slot.session.as_mut().filter(|s| s.is_open()) {
            let superseded = session.citizen_connection_id != Some(citizen_connection);
            let was_detached = !session.is_citizen_attached();
            session.reattach_citizen(citizen_connection);
            let session = session.clone();
            if was_detached {
                self.dispatcher
                    .on_session_event(citizen_id, SessionEvent::CitizenReconnected)
                    .await;
            }
            if superseded {
                tracing::info!(session_id = %citizen_id, connection_id = %citizen_connection, "Citizen rebound to open session");
            }
            self.push(
                &citizen_connection,
                &ServerEvent::HelpRequested {
                    session_id: citizen_id.as_str().to_string(),
                    state: session.state,
                },
            )
            .await;
            self.replay_history(&citizen_connection, &slot).await;
            return RequestOutcome::Attached(session);
        }

        let session = ChatSession::request(citizen_id.clone(), citizen_connection, now);
        let mut queue = self.queue.lock().await;
        slot.reset(session.clone());
        queue.enqueue(citizen_id.clone());
        tracing::info!(session_id = %citizen_id, connection_id = %citizen_connection, "Session requested");

        self.push(
            &citizen_connection,
            &ServerEvent::HelpRequested {
                session_id: citizen_id.as_str().to_string(),
                state: SessionState::Requested,
            },
        )
        .await;
        queue.publish().await;
        RequestOutcome::Created(session)
    }

    /// Reconnect case: bind a new citizen connection to its open session and
    /// replay the log to it. Returns `None` when there is nothing to attach to.
    pub async fn reattach_citizen(
        &self,
        citizen_id: &ExternalId,
        citizen_connection: ConnectionId,
    ) -> Option<ChatSession> {
        let mut slot = self.lock_slot(citizen_id).await?;
        let session = slot.session.as_mut().filter(|s| s.is_open())?;
        let was_detached = !session.is_citizen_attached();
        session.reattach_citizen(citizen_connection);
        let session = session.clone();

        tracing::info!(session_id = %citizen_id, connection_id = %citizen_connection, "Citizen reattached to session");
        if was_detached {
            self.dispatcher
                .on_session_event(citizen_id, SessionEvent::CitizenReconnected)
                .await;
        }
        self.push(
            &citizen_connection,
            &ServerEvent::HelpRequested {
                session_id: citizen_id.as_str().to_string(),
                state: session.state,
            },
        )
        .await;
        self.replay_history(&citizen_connection, &slot).await;
        Some(session)
    }

    /// `claim`: `REQUESTED` → `JOINED` for exactly one admin. The winner
    /// gets the log replayed; losers get `ALREADY_CLAIMED` and nothing changes.
    pub async fn claim(
        &self,
        citizen_id: &ExternalId,
        admin: ConnectionId,
    ) -> Result<ChatSession, SessionError> {
        let now = self.now();
        let mut slot = self
            .lock_slot(citizen_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        let mut claims = self.claims.lock().await;
        let mut queue = self.queue.lock().await;
        let session = slot
            .session
            .as_mut()
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;

        session.claim(admin, now)?;
        let session = session.clone();
        add_claim(&mut claims, admin, citizen_id);
        queue.dequeue(citizen_id);
        drop(claims);
        tracing::info!(session_id = %citizen_id, admin = %admin, "Session claimed");

        queue.publish().await;
        self.replay_history(&admin, &slot).await;
        self.notify_citizen(&session, SessionEvent::AdminJoined).await;
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::AdminJoined)
            .await;
        Ok(session)
    }

    /// `activate`: `JOINED` → `ACTIVE`. Normally driven by the first append.
    pub async fn activate(&self, citizen_id: &ExternalId) -> Result<bool, SessionError> {
        let now = self.now();
        let mut slot = self
            .lock_slot(citizen_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        let session = slot
            .session
            .as_mut()
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        session.activate(now)
    }

    /// The citizen's transport went away.
    ///
    /// Starts the reconnect grace window, or closes at once when the window
    /// is zero. A stale connection that was already superseded is ignored.
    pub async fn detach_citizen(&self, citizen_id: &ExternalId, connection: &ConnectionId) {
        if self.config.citizen_reconnect_grace.is_zero() {
            self.close_for_citizen(citizen_id, Some(connection)).await;
            return;
        }

        let now = self.now();
        let Some(mut slot) = self.lock_slot(citizen_id).await else {
            return;
        };
        let Some(session) = slot.session.as_mut() else {
            return;
        };
        if session.detach_citizen(connection, now) {
            tracing::info!(session_id = %citizen_id, "Citizen detached; awaiting reconnect");
            self.dispatcher
                .on_session_event(citizen_id, SessionEvent::CitizenDisconnected)
                .await;
        }
    }

    /// `disconnectCitizen`: any state → `CLOSED`, the bound admin is told the
    /// citizen left.
    pub async fn disconnect_citizen(&self, citizen_id: &ExternalId) -> Result<(), SessionError> {
        if self.close_for_citizen(citizen_id, None).await {
            Ok(())
        } else {
            Err(SessionError::SessionNotFound(citizen_id.as_str().to_string()))
        }
    }

    /// Close on behalf of the citizen. With `expected` set, only closes if
    /// that connection is still the bound one.
    async fn close_for_citizen(
        &self,
        citizen_id: &ExternalId,
        expected: Option<&ConnectionId>,
    ) -> bool {
        let now = self.now();
        let Some(mut slot) = self.lock_slot(citizen_id).await else {
            return false;
        };
        let mut claims = self.claims.lock().await;
        let mut queue = self.queue.lock().await;
        let Some(session) = slot.session.as_mut().filter(|s| s.is_open()) else {
            return false;
        };
        if let Some(expected) = expected
            && session.citizen_connection_id.as_ref() != Some(expected)
        {
            return false;
        }

        let admin = session.disconnect_citizen(now);
        let session = session.clone();
        queue.dequeue(citizen_id);
        if let Some(admin) = &admin {
            remove_claim(&mut claims, admin, citizen_id);
        }
        drop(claims);
        tracing::info!(session_id = %citizen_id, "Citizen left; session closed");

        queue.publish().await;
        if let Some(admin) = admin {
            self.push(
                &admin,
                &ServerEvent::SessionEvent {
                    session_id: session.session_id.as_str().to_string(),
                    event: SessionEvent::CitizenLeft,
                },
            )
            .await;
        }
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::Closed)
            .await;
        let transcript = slot.transcript();
        drop(slot);

        self.archive_transcript(transcript).await;
        true
    }

    /// `disconnectAdmin`: `JOINED`/`ACTIVE` → `REQUESTED` with the citizen
    /// back at the front of the queue, or `CLOSED` if the citizen is gone too.
    pub async fn disconnect_admin(
        &self,
        citizen_id: &ExternalId,
        admin: &ConnectionId,
    ) -> Result<AdminDropOutcome, SessionError> {
        let now = self.now();
        let mut slot = self
            .lock_slot(citizen_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        let mut claims = self.claims.lock().await;
        let mut queue = self.queue.lock().await;
        let session = slot
            .session
            .as_mut()
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        if session.admin_connection_id.as_ref() != Some(admin) {
            return Err(SessionError::NotSessionParticipant(
                citizen_id.as_str().to_string(),
            ));
        }

        let outcome = session.disconnect_admin(now)?;
        let session = session.clone();
        remove_claim(&mut claims, admin, citizen_id);
        if outcome == AdminDropOutcome::Requeued {
            queue.requeue_front(citizen_id.clone());
        }
        drop(claims);
        queue.publish().await;

        match outcome {
            AdminDropOutcome::Requeued => {
                tracing::info!(session_id = %citizen_id, %admin, "Admin left; session requeued");
                self.notify_citizen(&session, SessionEvent::AdminLeft).await;
                self.dispatcher
                    .on_session_event(citizen_id, SessionEvent::Requeued)
                    .await;
            }
            AdminDropOutcome::Closed => {
                tracing::info!(session_id = %citizen_id, %admin, "Admin left a detached citizen; session closed");
                self.dispatcher
                    .on_session_event(citizen_id, SessionEvent::Closed)
                    .await;
                let transcript = slot.transcript();
                drop(slot);
                self.archive_transcript(transcript).await;
            }
        }
        Ok(outcome)
    }

    /// Run `disconnectAdmin` for every session an admin connection holds
    pub async fn release_admin(&self, admin: &ConnectionId) -> Vec<(ExternalId, AdminDropOutcome)> {
        // 索引からの削除は各 disconnect_admin が遷移と同時に行う
        let held = self.claimed_by(admin).await;

        let mut outcomes = Vec::with_capacity(held.len());
        for citizen_id in held {
            match self.disconnect_admin(&citizen_id, admin).await {
                Ok(outcome) => outcomes.push((citizen_id, outcome)),
                // 既に別経路で解放済み
                Err(e) => tracing::debug!(session_id = %citizen_id, %admin, "Skip release: {}", e),
            }
        }
        self.claims.lock().await.remove(admin);
        outcomes
    }

    /// `close`: explicit admin action, `JOINED`/`ACTIVE` → `CLOSED`.
    pub async fn close(
        &self,
        citizen_id: &ExternalId,
        admin: &ConnectionId,
    ) -> Result<ChatSession, SessionError> {
        let now = self.now();
        let mut slot = self
            .lock_slot(citizen_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        let mut claims = self.claims.lock().await;
        let session = slot
            .session
            .as_mut()
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        if session.admin_connection_id.as_ref() != Some(admin) {
            return Err(SessionError::NotSessionParticipant(
                citizen_id.as_str().to_string(),
            ));
        }

        let citizen = session.citizen_connection_id;
        session.close(now)?;
        let session = session.clone();
        remove_claim(&mut claims, admin, citizen_id);
        drop(claims);
        tracing::info!(session_id = %citizen_id, %admin, "Session closed by admin");

        let closed = ServerEvent::SessionEvent {
            session_id: citizen_id.as_str().to_string(),
            event: SessionEvent::Closed,
        };
        if let Some(citizen) = citizen {
            self.push(&citizen, &closed).await;
        }
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::Closed)
            .await;
        let transcript = slot.transcript();
        drop(slot);

        self.archive_transcript(transcript).await;
        Ok(session)
    }

    // ========================================
    // Queries
    // ========================================

    /// Full log of a session, open or closed (until purged)
    pub async fn history(&self, citizen_id: &ExternalId) -> Result<Vec<ChatMessage>, SessionError> {
        let slot = self
            .lock_slot(citizen_id)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(citizen_id.as_str().to_string()))?;
        if slot.session.is_none() {
            return Err(SessionError::SessionNotFound(citizen_id.as_str().to_string()));
        }
        Ok(slot.history.clone())
    }

    pub async fn get(&self, citizen_id: &ExternalId) -> Option<SessionSummary> {
        let slot = self.lock_slot(citizen_id).await?;
        let session = slot.session.clone()?;
        Some(SessionSummary {
            session,
            message_count: slot.history.len(),
        })
    }

    /// Sessions an admin connection currently holds
    pub async fn claimed_by(&self, admin: &ConnectionId) -> Vec<ExternalId> {
        self.claims
            .lock()
            .await
            .get(admin)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn counts(&self) -> SessionCounts {
        let mut counts = SessionCounts::default();
        for session_id in self.session_ids().await {
            let Some(summary) = self.get(&session_id).await else {
                continue;
            };
            match summary.session.state {
                SessionState::Requested => counts.requested += 1,
                SessionState::Joined => counts.joined += 1,
                SessionState::Active => counts.active += 1,
                SessionState::Closed => counts.closed += 1,
            }
        }
        counts
    }

    // ========================================
    // Timeout policies
    // ========================================

    /// Apply the configured timeout policies to one session
    pub async fn apply_policies(&self, citizen_id: &ExternalId) -> Option<PolicyAction> {
        let now = self.now();
        let (state, state_age, detached_for) = {
            let slot = self.lock_slot(citizen_id).await?;
            match slot.session() {
                Some(session) => (
                    session.state,
                    session.state_changed_at.elapsed_until(now),
                    session.citizen_detached_at.map(|at| at.elapsed_until(now)),
                ),
                None => (SessionState::Closed, i64::MAX, None),
            }
        };

        // 各ポリシーは内部でスロットを取り直し、状態を再検証する
        if state == SessionState::Closed {
            let retention = duration_millis(self.config.closed_retention);
            if state_age >= retention && self.purge(citizen_id, retention).await {
                return Some(PolicyAction::Purged);
            }
            return None;
        }

        if let Some(detached_for) = detached_for
            && detached_for >= duration_millis(self.config.citizen_reconnect_grace)
            && self.expire_detached_citizen(citizen_id).await
        {
            return Some(PolicyAction::CitizenGraceExpired);
        }

        if state == SessionState::Joined
            && let Some(timeout) = self.config.join_silence_timeout
            && state_age >= duration_millis(timeout)
            && self.release_silent_claim(citizen_id, duration_millis(timeout)).await
        {
            return Some(PolicyAction::SilentClaimReleased);
        }

        if state == SessionState::Requested
            && let Some(timeout) = self.config.queue_idle_timeout
            && state_age >= duration_millis(timeout)
            && self.abandon_request(citizen_id, duration_millis(timeout)).await
        {
            return Some(PolicyAction::QueueTimeout);
        }

        None
    }

    /// Close a session whose citizen stayed detached for the whole grace
    /// window. Re-checked under the slot lock: a reconnect in between wins.
    async fn expire_detached_citizen(&self, citizen_id: &ExternalId) -> bool {
        let grace = duration_millis(self.config.citizen_reconnect_grace);
        let now = self.now();
        let Some(mut slot) = self.lock_slot(citizen_id).await else {
            return false;
        };
        let mut claims = self.claims.lock().await;
        let mut queue = self.queue.lock().await;
        let Some(session) = slot.session.as_mut().filter(|s| {
            s.is_open()
                && s.citizen_detached_at
                    .is_some_and(|at| at.elapsed_until(now) >= grace)
        }) else {
            return false;
        };

        let admin = session.disconnect_citizen(now);
        queue.dequeue(citizen_id);
        if let Some(admin) = &admin {
            remove_claim(&mut claims, admin, citizen_id);
        }
        drop(claims);
        tracing::info!(session_id = %citizen_id, "Citizen reconnect grace expired; session closed");

        queue.publish().await;
        if let Some(admin) = admin {
            self.push(
                &admin,
                &ServerEvent::SessionEvent {
                    session_id: citizen_id.as_str().to_string(),
                    event: SessionEvent::CitizenLeft,
                },
            )
            .await;
        }
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::Closed)
            .await;
        let transcript = slot.transcript();
        drop(slot);

        self.archive_transcript(transcript).await;
        true
    }

    async fn release_silent_claim(&self, citizen_id: &ExternalId, timeout: i64) -> bool {
        let now = self.now();
        let Some(mut slot) = self.lock_slot(citizen_id).await else {
            return false;
        };
        let mut claims = self.claims.lock().await;
        let mut queue = self.queue.lock().await;
        let Some(session) = slot.session.as_mut() else {
            return false;
        };
        if session.state != SessionState::Joined
            || session.state_changed_at.elapsed_until(now) < timeout
        {
            return false;
        }
        let Ok(admin) = session.release_silent_claim(now) else {
            return false;
        };
        let session = session.clone();
        remove_claim(&mut claims, &admin, citizen_id);
        queue.requeue_front(citizen_id.clone());
        drop(claims);
        tracing::info!(session_id = %citizen_id, %admin, "Silent claim released");

        queue.publish().await;
        // 登録済みの admin コンソールには下の on_session_event で届く
        if !self.dispatcher.is_admin(&admin).await {
            self.push(
                &admin,
                &ServerEvent::SessionEvent {
                    session_id: citizen_id.as_str().to_string(),
                    event: SessionEvent::Requeued,
                },
            )
            .await;
        }
        self.notify_citizen(&session, SessionEvent::AdminLeft).await;
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::Requeued)
            .await;
        true
    }

    async fn abandon_request(&self, citizen_id: &ExternalId, timeout: i64) -> bool {
        let now = self.now();
        let Some(mut slot) = self.lock_slot(citizen_id).await else {
            return false;
        };
        let mut queue = self.queue.lock().await;
        let Some(session) = slot.session.as_mut() else {
            return false;
        };
        if session.state != SessionState::Requested
            || session.state_changed_at.elapsed_until(now) < timeout
        {
            return false;
        }
        let citizen = session.citizen_connection_id;
        if session.abandon(now).is_err() {
            return false;
        }
        queue.dequeue(citizen_id);
        tracing::info!(session_id = %citizen_id, "Pending request timed out");

        queue.publish().await;
        if let Some(citizen) = citizen {
            self.push(
                &citizen,
                &ServerEvent::SessionEvent {
                    session_id: citizen_id.as_str().to_string(),
                    event: SessionEvent::Closed,
                },
            )
            .await;
        }
        self.dispatcher
            .on_session_event(citizen_id, SessionEvent::Closed)
            .await;
        let transcript = slot.transcript();
        drop(slot);

        self.archive_transcript(transcript).await;
        true
    }

    /// Drop a closed session whose retention elapsed. The slot is retired
    /// under the map lock so nobody keeps mutating an orphan.
    async fn purge(&self, citizen_id: &ExternalId, retention: i64) -> bool {
        let now = self.now();
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get(citizen_id).cloned() else {
            return false;
        };
        // 使用中のスロットは次回のスイープに回す
        let Ok(mut guard) = slot.try_lock_owned() else {
            return false;
        };
        let expired = match guard.session() {
            Some(session) => {
                !session.is_open() && session.state_changed_at.elapsed_until(now) >= retention
            }
            None => true,
        };
        if !expired {
            return false;
        }
        guard.retired = true;
        slots.remove(citizen_id);
        tracing::debug!(session_id = %citizen_id, "Closed session purged");
        true
    }
}

fn add_claim(claims: &mut ClaimIndex, admin: ConnectionId, session_id: &ExternalId) {
    claims.entry(admin).or_default().insert(session_id.clone());
}

fn remove_claim(claims: &mut ClaimIndex, admin: &ConnectionId, session_id: &ExternalId) {
    if let Some(held) = claims.get_mut(admin) {
        held.remove(session_id);
        if held.is_empty() {
            claims.remove(admin);
        }
    }
}

fn duration_millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
