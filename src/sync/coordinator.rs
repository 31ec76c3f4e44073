//! Reading-progress state machine.
//!
//! Every position change from the renderer lands here. Regressions below the session's
//! high-water mark are dropped; everything else is saved locally after a short debounce
//! and sent to the remote service after a longer one. Remote failures, and any attempt
//! made while offline or unauthorised, fall back to the durable [`SyncQueue`], which is
//! drained again on reconnect.
//!
//! Work for a single book is serialised through that book's session gate, so a local
//! save, a direct remote sync and a queue drain for the same book never interleave.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{sync::broadcast, task::JoinHandle};

use super::debounce::DebouncedTasks;
use crate::{
    connectivity::ConnectivityMonitor,
    domain::{DispatchOutcome, DrainReport, SyncQueueItem, percentage_from_fraction},
    remote_client::RemoteProgress,
    storage::{self, ProgressStore, SyncQueue},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub local_save_debounce: Duration,
    pub remote_sync_debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            local_save_debounce: Duration::from_millis(500),
            remote_sync_debounce: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingUpdate {
    position: String,
    percentage: u8,
}

#[derive(Debug, Default)]
struct SessionState {
    /// Never decreases while the process runs.
    max_percentage_seen: Option<u8>,
    latest: Option<PendingUpdate>,
    local_dirty: bool,
    remote_dirty: bool,
    /// Highest percentage the remote service has acknowledged this session.
    last_acknowledged: Option<u8>,
}

impl SessionState {
    fn take_local(&mut self) -> Option<PendingUpdate> {
        if !self.local_dirty {
            return None;
        }
        self.local_dirty = false;
        self.latest.clone()
    }

    fn take_remote(&mut self) -> Option<PendingUpdate> {
        if !self.remote_dirty {
            return None;
        }
        self.remote_dirty = false;
        self.latest.clone()
    }

    fn has_pending(&self) -> bool {
        self.local_dirty || self.remote_dirty
    }

    fn acknowledge(&mut self, percentage: u8) {
        self.last_acknowledged = Some(self.last_acknowledged.map_or(percentage, |p| p.max(percentage)));
    }
}

#[derive(Debug, Default)]
struct BookSession {
    gate: tokio::sync::Mutex<()>,
    state: Mutex<SessionState>,
}

impl BookSession {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ProgressSyncCoordinator {
    store: Arc<dyn ProgressStore>,
    queue: Arc<dyn SyncQueue>,
    remote: Arc<dyn RemoteProgress>,
    connectivity: Arc<ConnectivityMonitor>,
    settings: SyncSettings,
    sessions: Mutex<HashMap<String, Arc<BookSession>>>,
    local_saves: DebouncedTasks<String>,
    remote_syncs: DebouncedTasks<String>,
}

impl ProgressSyncCoordinator {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        queue: Arc<dyn SyncQueue>,
        remote: Arc<dyn RemoteProgress>,
        connectivity: Arc<ConnectivityMonitor>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            remote,
            connectivity,
            settings,
            sessions: Mutex::new(HashMap::new()),
            local_saves: DebouncedTasks::new(),
            remote_syncs: DebouncedTasks::new(),
        })
    }

    fn session(&self, book_id: &str) -> Arc<BookSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(book_id.to_owned()).or_default())
    }

    fn can_reach_remote(&self) -> bool {
        self.connectivity.is_online() && self.remote.is_authorized()
    }

    /// Renderer entry point. `fraction` is the renderer's 0.0 - 1.0 progress estimate.
    /// Returns whether the event was accepted; it never waits on I/O.
    pub fn on_position_changed(self: &Arc<Self>, book_id: &str, position: &str, fraction: f64) -> bool {
        self.record_position(book_id, position, percentage_from_fraction(fraction))
    }

    /// Same as [`Self::on_position_changed`] with an already rounded percentage.
    pub fn record_position(self: &Arc<Self>, book_id: &str, position: &str, percentage: u8) -> bool {
        let percentage = percentage.min(100);
        let session = self.session(book_id);
        {
            let mut state = session.state();
            if let Some(max) = state.max_percentage_seen {
                if percentage < max {
                    tracing::debug!(%book_id, percentage, max, "discarding regressive position");
                    return false;
                }
            }
            state.max_percentage_seen = Some(percentage);
            state.latest = Some(PendingUpdate {
                position: position.to_owned(),
                percentage,
            });
            state.local_dirty = true;
            state.remote_dirty = true;
        }

        let this = Arc::clone(self);
        let key = book_id.to_owned();
        self.local_saves.schedule(
            key.clone(),
            self.settings.local_save_debounce,
            async move { this.save_local(&key).await },
        );

        let this = Arc::clone(self);
        let key = book_id.to_owned();
        self.remote_syncs.schedule(
            key.clone(),
            self.settings.remote_sync_debounce,
            async move { this.sync_remote(&key).await },
        );
        true
    }

    /// Raise the book's high-water mark, typically to the value restored on open.
    pub fn seed_high_water_mark(&self, book_id: &str, percentage: u8) {
        let session = self.session(book_id);
        let mut state = session.state();
        let seeded = state.max_percentage_seen.map_or(percentage, |max| max.max(percentage));
        state.max_percentage_seen = Some(seeded.min(100));
    }

    /// Record what the server holds for the book. Queued items below it are dropped
    /// on drain instead of rolling the server back.
    pub fn note_remote_progress(&self, book_id: &str, percentage: u8) {
        self.session(book_id).state().acknowledge(percentage.min(100));
    }

    pub fn high_water_mark(&self, book_id: &str) -> Option<u8> {
        self.session(book_id).state().max_percentage_seen
    }

    /// Skip the debounce windows: save locally and attempt the remote sync now.
    /// Await this before tearing down a reading view.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn flush_now(&self, book_id: &str) {
        let key = book_id.to_owned();
        self.local_saves.cancel(&key);
        self.remote_syncs.cancel(&key);
        self.save_local(book_id).await;
        self.sync_remote(book_id).await;
    }

    /// Flush every book with unsaved or unsent progress, e.g. on shutdown. Sessions
    /// stay registered afterwards since their high-water marks must outlive the flush.
    /// Returns how many books were flushed.
    pub async fn flush_all(&self) -> usize {
        let book_ids: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, session)| session.state().has_pending())
            .map(|(book_id, _)| book_id.clone())
            .collect();
        for book_id in &book_ids {
            self.flush_now(book_id).await;
        }
        book_ids.len()
    }

    async fn save_local(&self, book_id: &str) {
        let session = self.session(book_id);
        let _gate = session.gate.lock().await;
        let Some(update) = session.state().take_local() else {
            return;
        };

        match self
            .store
            .upsert(book_id, Some(&update.position), update.percentage)
            .await
        {
            Ok(true) => {
                tracing::debug!(%book_id, percentage = update.percentage, "saved local progress")
            }
            Ok(false) => {
                tracing::debug!(%book_id, percentage = update.percentage, "stored progress is already ahead")
            }
            Err(e) => {
                // Retried on the next event or flush; the high-water mark still holds.
                tracing::warn!(%book_id, percentage = update.percentage, error = %e, "failed to save local progress");
                session.state().local_dirty = true;
            }
        }
    }

    async fn sync_remote(&self, book_id: &str) {
        let session = self.session(book_id);
        let _gate = session.gate.lock().await;
        let Some(update) = session.state().take_remote() else {
            return;
        };

        if !self.can_reach_remote() {
            tracing::debug!(%book_id, percentage = update.percentage, "remote unreachable, queueing");
            self.enqueue(&session, book_id, &update).await;
            return;
        }

        match self
            .remote
            .upsert(book_id, Some(&update.position), update.percentage)
            .await
        {
            Ok(ack) => {
                session.state().acknowledge(update.percentage);
                tracing::debug!(%book_id, percentage = ack.percentage, "remote acknowledged progress");
                // Anything queued for this book is older than what was just acknowledged.
                if let Err(e) = self.queue.dequeue(book_id).await {
                    tracing::warn!(%book_id, error = %e, "failed to drop superseded queue item");
                }
            }
            Err(e) => {
                tracing::warn!(%book_id, percentage = update.percentage, error = %e, "remote sync failed, queueing");
                self.enqueue(&session, book_id, &update).await;
            }
        }
    }

    async fn enqueue(&self, session: &BookSession, book_id: &str, update: &PendingUpdate) {
        match self
            .queue
            .enqueue(book_id, Some(&update.position), update.percentage)
            .await
        {
            Ok(item) => {
                tracing::debug!(%book_id, id = %item.id, percentage = item.percentage, "queued for later sync")
            }
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "failed to queue progress update");
                session.state().remote_dirty = true;
            }
        }
    }

    /// Drain the sync queue through the remote client. No-op while offline or
    /// unauthorised.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn on_reconnect(&self) -> DrainReport {
        if !self.can_reach_remote() {
            tracing::debug!("remote unreachable, not draining");
            return DrainReport::default();
        }

        match storage::drain(self.queue.as_ref(), move |item| self.dispatch_queued(item)).await {
            Ok(report) => {
                if !report.is_empty() {
                    tracing::info!(
                        delivered = report.delivered,
                        superseded = report.superseded,
                        failed = report.failed,
                        "drained sync queue"
                    );
                }
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read sync queue");
                DrainReport::default()
            }
        }
    }

    async fn dispatch_queued(&self, item: SyncQueueItem) -> DispatchOutcome {
        let book_id = item.book_id.as_str();
        let session = self.session(book_id);
        let _gate = session.gate.lock().await;

        // A direct sync may have replaced or removed the entry while we waited.
        match self.queue.get(book_id).await {
            Ok(Some(live)) if live.id == item.id => {}
            Ok(_) => return DispatchOutcome::Superseded,
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "failed to re-read queue item");
                return DispatchOutcome::Failed;
            }
        }

        let acknowledged = session.state().last_acknowledged;
        if acknowledged.is_some_and(|acked| acked > item.percentage) {
            tracing::debug!(%book_id, percentage = item.percentage, ?acknowledged, "dropping stale queue item");
            return DispatchOutcome::Superseded;
        }
        if !self.can_reach_remote() {
            return DispatchOutcome::Failed;
        }

        match self
            .remote
            .upsert(book_id, item.position.as_deref(), item.percentage)
            .await
        {
            Ok(_) => {
                session.state().acknowledge(item.percentage);
                DispatchOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(%book_id, attempts = item.attempts + 1, error = %e, "queued sync failed");
                DispatchOutcome::Failed
            }
        }
    }

    /// Drain on every reconnect trigger emitted by the connectivity monitor. The task
    /// ends when the coordinator is dropped.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut triggers = self.connectivity.subscribe();
        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match triggers.recv().await {
                    Ok(trigger) => tracing::debug!(?trigger, "reconnect trigger"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "reconnect triggers lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                coordinator.on_reconnect().await;
            }
        })
    }
}
