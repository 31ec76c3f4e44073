pub mod coordinator;
pub mod debounce;

pub use coordinator::{ProgressSyncCoordinator, SyncSettings};
