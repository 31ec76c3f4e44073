pub use sea_orm_migration::prelude::*;

mod m20250901_093012_create_progress_records_table;
mod m20250901_093547_create_sync_queue_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_093012_create_progress_records_table::Migration),
            Box::new(m20250901_093547_create_sync_queue_table::Migration),
        ]
    }
}
