//! sea-orm entities for the reader's local durable store.

pub mod progress_record;
pub mod sync_queue_item;

pub mod prelude {
    pub use super::progress_record::Entity as ProgressRecord;
    pub use super::sync_queue_item::Entity as SyncQueueItem;
}
