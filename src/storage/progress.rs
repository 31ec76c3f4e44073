use std::sync::Arc;

use entities::progress_record::{self, Entity as ProgressRecords};
use sea_orm::{
    ActiveValue::Set,
    DatabaseConnection, EntityTrait, QueryOrder,
    sea_query::{Expr, OnConflict},
};

use super::ProgressStore;
use crate::domain::{ProgressRecord, mapping};

#[derive(Clone, Debug)]
pub struct SeaOrmProgressStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmProgressStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ProgressStore for SeaOrmProgressStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        let row = ProgressRecords::find_by_id(book_id.to_owned())
            .one(self.db.as_ref())
            .await?;
        Ok(row.map(mapping::map_progress_model))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>> {
        let rows = ProgressRecords::find()
            .order_by_desc(progress_record::Column::LastUpdatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(mapping::map_progress_model).collect())
    }

    #[tracing::instrument(level = "debug", skip(self, record), fields(book_id = %record.book_id, percentage = record.percentage))]
    async fn write(&self, record: &ProgressRecord) -> anyhow::Result<bool> {
        anyhow::ensure!(
            record.is_consistent(),
            "progress for {} has no position at {}%",
            record.book_id,
            record.percentage
        );
        let percentage = i32::from(record.percentage);
        let model = progress_record::ActiveModel {
            book_id: Set(record.book_id.clone()),
            position: Set(record.position.clone()),
            percentage: Set(percentage),
            last_updated_at: Set(record.last_updated_at),
        };

        // Single statement, so the monotonic check and the write are atomic per record.
        let rows = ProgressRecords::insert(model)
            .on_conflict(
                OnConflict::column(progress_record::Column::BookId)
                    .update_columns([
                        progress_record::Column::Position,
                        progress_record::Column::Percentage,
                        progress_record::Column::LastUpdatedAt,
                    ])
                    .action_and_where(
                        Expr::col((ProgressRecords, progress_record::Column::Percentage))
                            .lte(percentage),
                    )
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(rows > 0)
    }
}
