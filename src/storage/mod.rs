// Local durable store: progress records and the pending-sync queue, backed by sqlite

mod progress;
mod queue;

use std::future::Future;

use anyhow::Context;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use crate::domain::{DispatchOutcome, DrainReport, ProgressRecord, SyncQueueItem};

pub use progress::SeaOrmProgressStore;
pub use queue::SeaOrmSyncQueue;

#[async_trait::async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>>;

    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>>;

    /// Store `record` as-is (timestamp included) unless the stored percentage for the
    /// book is higher. Returns whether the write was applied.
    async fn write(&self, record: &ProgressRecord) -> anyhow::Result<bool>;

    /// Monotonic upsert stamped with the current time.
    async fn upsert(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<bool> {
        let record = ProgressRecord::new(
            book_id,
            position.map(str::to_owned),
            percentage,
            Utc::now(),
        );
        self.write(&record).await
    }
}

/// Durable queue of remote updates that could not be delivered yet. At most one entry
/// per book; enqueuing again replaces it.
#[async_trait::async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<SyncQueueItem>;

    /// Remove whatever is queued for the book. Returns whether anything was removed.
    async fn dequeue(&self, book_id: &str) -> anyhow::Result<bool>;

    async fn get(&self, book_id: &str) -> anyhow::Result<Option<SyncQueueItem>>;

    async fn list(&self) -> anyhow::Result<Vec<SyncQueueItem>>;

    /// Pending -> InFlight for this exact entry. False if it was replaced, removed or
    /// is already being dispatched.
    async fn begin(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Delete this exact entry. A replacement enqueued meanwhile is left alone.
    async fn complete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// InFlight -> Pending and count the failed attempt.
    async fn fail(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Reset entries left InFlight by a previous process.
    async fn recover_in_flight(&self) -> anyhow::Result<u64>;

    async fn clear(&self) -> anyhow::Result<u64>;
}

/// Dispatch every pending entry once. Delivered and superseded entries are removed,
/// failed ones stay pending for the next drain.
pub async fn drain<F, Fut>(queue: &dyn SyncQueue, mut dispatch: F) -> anyhow::Result<DrainReport>
where
    F: FnMut(SyncQueueItem) -> Fut,
    Fut: Future<Output = DispatchOutcome>,
{
    let mut report = DrainReport::default();
    let items = queue.list().await?;
    for item in items {
        let id = item.id;
        let book_id = item.book_id.clone();
        match queue.begin(id).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                tracing::warn!(%book_id, error = %e, "failed to claim queue item");
                continue;
            }
        }

        let outcome = dispatch(item).await;
        let settled = match outcome {
            DispatchOutcome::Delivered | DispatchOutcome::Superseded => queue.complete(id).await,
            DispatchOutcome::Failed => queue.fail(id).await,
        };
        if let Err(e) = settled {
            tracing::warn!(%book_id, ?outcome, error = %e, "failed to settle queue item");
        }
        report.record(outcome);
    }
    Ok(report)
}

/// Connect to the local store and bring its schema up to date.
pub async fn open(connection_string: &str) -> anyhow::Result<DatabaseConnection> {
    let db = Database::connect(connection_string)
        .await
        .with_context(|| "Failed to connect to database")?;

    migration::Migrator::up(&db, None)
        .await
        .with_context(|| "Failed to run database migrations")?;
    Ok(db)
}
