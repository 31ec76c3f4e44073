//! Pending remote updates. Keyed by book so a book never has more than one live entry.

use sea_orm::entity::prelude::*;

pub const STATE_PENDING: &str = "pending";
pub const STATE_IN_FLIGHT: &str = "in_flight";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_queue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub book_id: String,
    /// Regenerated on every enqueue, so a drain can tell whether the entry it
    /// dispatched has since been replaced.
    #[sea_orm(unique)]
    pub id: Uuid,
    pub position: Option<String>,
    pub percentage: i32,
    pub enqueued_at: DateTimeUtc,
    pub state: String,
    pub attempts: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
