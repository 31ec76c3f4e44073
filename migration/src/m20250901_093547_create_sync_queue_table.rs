use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncQueue::Table)
                    .if_not_exists()
                    .col(string(SyncQueue::BookId).primary_key())
                    .col(uuid_uniq(SyncQueue::Id))
                    .col(string_null(SyncQueue::Position))
                    .col(integer(SyncQueue::Percentage))
                    .col(timestamp_with_time_zone(SyncQueue::EnqueuedAt))
                    .col(string(SyncQueue::State))
                    .col(integer(SyncQueue::Attempts).default(0))
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncQueue::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SyncQueue {
    Table,
    BookId,
    Id,
    Position,
    Percentage,
    EnqueuedAt,
    State,
    Attempts,
}
