use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProgressRecords::Table)
                    .if_not_exists()
                    .col(string(ProgressRecords::BookId).primary_key())
                    .col(string_null(ProgressRecords::Position))
                    .col(integer(ProgressRecords::Percentage))
                    .col(timestamp_with_time_zone(ProgressRecords::LastUpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProgressRecords::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum ProgressRecords {
    Table,
    BookId,
    Position,
    Percentage,
    LastUpdatedAt,
}
