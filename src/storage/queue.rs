use std::sync::Arc;

use entities::sync_queue_item::{self, Entity as SyncQueueItems, STATE_IN_FLIGHT, STATE_PENDING};
use sea_orm::{
    ActiveValue::Set,
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use super::SyncQueue;
use crate::domain::{SyncQueueItem, mapping};

#[derive(Clone, Debug)]
pub struct SeaOrmSyncQueue {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmSyncQueue {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl SyncQueue for SeaOrmSyncQueue {
    #[tracing::instrument(level = "debug", skip(self, position))]
    async fn enqueue(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<SyncQueueItem> {
        let item = SyncQueueItem::new(book_id, position.map(str::to_owned), percentage);
        let model = sync_queue_item::ActiveModel {
            book_id: Set(item.book_id.clone()),
            id: Set(item.id),
            position: Set(item.position.clone()),
            percentage: Set(i32::from(item.percentage)),
            enqueued_at: Set(item.enqueued_at),
            state: Set(item.state.as_str().to_owned()),
            attempts: Set(0),
        };
        SyncQueueItems::insert(model)
            .on_conflict(
                OnConflict::column(sync_queue_item::Column::BookId)
                    .update_columns([
                        sync_queue_item::Column::Id,
                        sync_queue_item::Column::Position,
                        sync_queue_item::Column::Percentage,
                        sync_queue_item::Column::EnqueuedAt,
                        sync_queue_item::Column::State,
                        sync_queue_item::Column::Attempts,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        tracing::debug!(%book_id, id = %item.id, "queued progress update");
        Ok(item)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn dequeue(&self, book_id: &str) -> anyhow::Result<bool> {
        let res = SyncQueueItems::delete_many()
            .filter(sync_queue_item::Column::BookId.eq(book_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn get(&self, book_id: &str) -> anyhow::Result<Option<SyncQueueItem>> {
        let row = SyncQueueItems::find_by_id(book_id.to_owned())
            .one(self.db.as_ref())
            .await?;
        Ok(row.map(mapping::map_queue_model))
    }

    async fn list(&self) -> anyhow::Result<Vec<SyncQueueItem>> {
        let rows = SyncQueueItems::find()
            .order_by_asc(sync_queue_item::Column::EnqueuedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(mapping::map_queue_model).collect())
    }

    async fn begin(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = SyncQueueItems::update_many()
            .col_expr(sync_queue_item::Column::State, Expr::value(STATE_IN_FLIGHT))
            .filter(sync_queue_item::Column::Id.eq(id))
            .filter(sync_queue_item::Column::State.eq(STATE_PENDING))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected == 1)
    }

    async fn complete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = SyncQueueItems::delete_many()
            .filter(sync_queue_item::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn fail(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = SyncQueueItems::update_many()
            .col_expr(sync_queue_item::Column::State, Expr::value(STATE_PENDING))
            .col_expr(
                sync_queue_item::Column::Attempts,
                Expr::col(sync_queue_item::Column::Attempts).add(1),
            )
            .filter(sync_queue_item::Column::Id.eq(id))
            .filter(sync_queue_item::Column::State.eq(STATE_IN_FLIGHT))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected == 1)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn recover_in_flight(&self) -> anyhow::Result<u64> {
        let res = SyncQueueItems::update_many()
            .col_expr(sync_queue_item::Column::State, Expr::value(STATE_PENDING))
            .filter(sync_queue_item::Column::State.eq(STATE_IN_FLIGHT))
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn clear(&self) -> anyhow::Result<u64> {
        let res = SyncQueueItems::delete_many()
            .exec(self.db.as_ref())
            .await?;
        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DispatchOutcome, QueueItemState};
    use crate::storage::{drain, test_support::temp_db};

    #[tokio::test]
    async fn repeated_enqueue_keeps_last_values() {
        let (_dir, db) = temp_db().await;
        let queue = SeaOrmSyncQueue::new(db);

        for pct in [10u8, 20, 35] {
            queue
                .enqueue("B1", Some(&format!("loc-{pct}")), pct)
                .await
                .unwrap();
        }

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].percentage, 35);
        assert_eq!(items[0].position.as_deref(), Some("loc-35"));
        assert_eq!(items[0].state, QueueItemState::Pending);
    }

    #[tokio::test]
    async fn drain_removes_delivered_and_keeps_failed() {
        let (_dir, db) = temp_db().await;
        let queue = SeaOrmSyncQueue::new(db);
        queue.enqueue("ok", Some("a"), 10).await.unwrap();
        queue.enqueue("bad", Some("b"), 20).await.unwrap();

        let report = drain(&queue, |item| async move {
            if item.book_id == "ok" {
                DispatchOutcome::Delivered
            } else {
                DispatchOutcome::Failed
            }
        })
        .await
        .unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(queue.get("ok").await.unwrap().is_none());
        let left = queue.get("bad").await.unwrap().unwrap();
        assert_eq!(left.state, QueueItemState::Pending);
        assert_eq!(left.attempts, 1);
    }

    #[tokio::test]
    async fn replacement_during_dispatch_survives_completion() {
        let (_dir, db) = temp_db().await;
        let queue = SeaOrmSyncQueue::new(db);
        let first = queue.enqueue("B1", Some("a"), 10).await.unwrap();

        assert!(queue.begin(first.id).await.unwrap());
        let second = queue.enqueue("B1", Some("b"), 40).await.unwrap();
        assert!(!queue.complete(first.id).await.unwrap());

        let live = queue.get("B1").await.unwrap().unwrap();
        assert_eq!(live.id, second.id);
        assert_eq!(live.percentage, 40);
        assert_eq!(live.state, QueueItemState::Pending);
    }

    #[tokio::test]
    async fn in_flight_item_is_not_claimed_twice() {
        let (_dir, db) = temp_db().await;
        let queue = SeaOrmSyncQueue::new(db);
        let item = queue.enqueue("B1", Some("a"), 10).await.unwrap();

        assert!(queue.begin(item.id).await.unwrap());
        assert!(!queue.begin(item.id).await.unwrap());

        assert_eq!(queue.recover_in_flight().await.unwrap(), 1);
        assert!(queue.begin(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn dequeue_and_clear() {
        let (_dir, db) = temp_db().await;
        let queue = SeaOrmSyncQueue::new(db);
        queue.enqueue("B1", Some("a"), 10).await.unwrap();
        queue.enqueue("B2", Some("b"), 10).await.unwrap();
        queue.enqueue("B3", Some("c"), 10).await.unwrap();

        assert!(queue.dequeue("B1").await.unwrap());
        assert!(!queue.dequeue("B1").await.unwrap());
        assert_eq!(queue.clear().await.unwrap(), 2);
        assert!(queue.list().await.unwrap().is_empty());
    }
}
