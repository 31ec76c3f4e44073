//! Picks the starting position when a book is opened.
//!
//! The local record and the remote one (when reachable) are compared and the freshest
//! wins. The result seeds the coordinator's high-water mark, and a winning remote record
//! is copied into the local store so both sides converge.

use std::{sync::Arc, time::Duration};

use crate::{
    connectivity::ConnectivityMonitor,
    domain::{ProgressRecord, ProgressSource, ResolvedPosition},
    remote_client::RemoteProgress,
    storage::ProgressStore,
    sync::ProgressSyncCoordinator,
};

pub struct RestorationService {
    store: Arc<dyn ProgressStore>,
    remote: Arc<dyn RemoteProgress>,
    connectivity: Arc<ConnectivityMonitor>,
    coordinator: Arc<ProgressSyncCoordinator>,
}

impl RestorationService {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        remote: Arc<dyn RemoteProgress>,
        connectivity: Arc<ConnectivityMonitor>,
        coordinator: Arc<ProgressSyncCoordinator>,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            coordinator,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, book_id: &str) -> ResolvedPosition {
        let local = match self.store.get(book_id).await {
            Ok(local) => local,
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "failed to read local progress");
                None
            }
        };
        let remote = self.fetch_remote(book_id).await;

        let resolved = match (&local, remote) {
            (None, None) => ResolvedPosition::empty(book_id),
            (Some(local), None) => ResolvedPosition::from_record(local, ProgressSource::Local),
            (Some(local), Some(remote)) if local.is_fresher_than(&remote) => {
                ResolvedPosition::from_record(local, ProgressSource::Local)
            }
            // Ties go to the server copy.
            (_, Some(remote)) => {
                if !local.as_ref().is_some_and(|l| l.same_progress(&remote)) {
                    self.converge_local(&remote).await;
                }
                ResolvedPosition::from_record(&remote, ProgressSource::Remote)
            }
        };

        self.coordinator
            .seed_high_water_mark(book_id, resolved.percentage);
        tracing::debug!(%book_id, percentage = resolved.percentage, source = ?resolved.source, "resolved starting position");
        resolved
    }

    async fn fetch_remote(&self, book_id: &str) -> Option<ProgressRecord> {
        if !self.connectivity.is_online() || !self.remote.is_authorized() {
            return None;
        }
        match self.remote.get_one(book_id).await {
            Ok(Some(record)) => {
                // The server already holds this much, whether or not it wins below.
                self.coordinator
                    .note_remote_progress(book_id, record.percentage);
                if !record.is_consistent() {
                    tracing::debug!(%book_id, percentage = record.percentage, "ignoring remote progress without a position");
                    return None;
                }
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "failed to fetch remote progress");
                None
            }
        }
    }

    async fn converge_local(&self, remote: &ProgressRecord) {
        match self.store.write(remote).await {
            Ok(true) => {
                tracing::debug!(book_id = %remote.book_id, percentage = remote.percentage, "copied remote progress locally")
            }
            Ok(false) => {
                tracing::debug!(book_id = %remote.book_id, "local progress is further along, keeping it")
            }
            Err(e) => {
                tracing::warn!(book_id = %remote.book_id, error = %e, "failed to copy remote progress locally")
            }
        }
    }
}

/// The renderer side of seeking: it may not have a seekable handle yet.
pub trait SeekTarget: Send + Sync {
    fn is_ready(&self) -> bool;

    /// Must be idempotent; it can be called again after a failure.
    fn seek(&self, position: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for SeekRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Applied,
    AlreadyApplied,
    /// No stored position; the renderer keeps its default start.
    NothingToApply,
    NotReady,
}

/// A resolved position waiting to be applied. It is kept until a seek succeeds, so a
/// late readiness signal can still apply it.
#[derive(Debug, Clone)]
pub struct PendingSeek {
    resolved: ResolvedPosition,
    applied: bool,
}

impl PendingSeek {
    pub fn new(resolved: ResolvedPosition) -> Self {
        Self {
            resolved,
            applied: false,
        }
    }

    /// Call on every readiness signal from the renderer.
    pub fn try_apply(&mut self, target: &dyn SeekTarget) -> SeekOutcome {
        if self.applied {
            return SeekOutcome::AlreadyApplied;
        }
        let Some(position) = self.resolved.position.as_deref() else {
            self.applied = true;
            return SeekOutcome::NothingToApply;
        };
        if !target.is_ready() {
            return SeekOutcome::NotReady;
        }
        match target.seek(position) {
            Ok(()) => {
                self.applied = true;
                SeekOutcome::Applied
            }
            Err(e) => {
                tracing::debug!(book_id = %self.resolved.book_id, error = %e, "seek failed, will retry");
                SeekOutcome::NotReady
            }
        }
    }

    /// Poll the renderer until the seek lands or the attempts run out. On give-up the
    /// position is still held for [`Self::try_apply`].
    pub async fn apply_with_retry(
        &mut self,
        target: &dyn SeekTarget,
        policy: SeekRetryPolicy,
    ) -> SeekOutcome {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let outcome = self.try_apply(target);
            if outcome != SeekOutcome::NotReady {
                return outcome;
            }
            if attempt < attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        tracing::warn!(book_id = %self.resolved.book_id, attempts, "renderer never became seekable");
        SeekOutcome::NotReady
    }
}
