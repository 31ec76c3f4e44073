// Mapping from storage rows and remote DTOs to domain models

use chrono::{DateTime, Utc};

use super::models::{ProgressRecord, QueueItemState, SyncQueueItem};
use crate::remote_client::RemoteProgressDto;

fn percentage_from_column(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

/// Remote records without a server timestamp sort as the oldest possible record.
pub fn map_remote_progress(dto: &RemoteProgressDto) -> ProgressRecord {
    ProgressRecord::new(
        dto.book_id.clone(),
        dto.position.clone().filter(|p| !p.is_empty()),
        dto.percentage,
        dto.last_read_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

pub fn map_progress_model(model: entities::progress_record::Model) -> ProgressRecord {
    ProgressRecord {
        book_id: model.book_id,
        position: model.position,
        percentage: percentage_from_column(model.percentage),
        last_updated_at: model.last_updated_at,
    }
}

pub fn map_queue_model(model: entities::sync_queue_item::Model) -> SyncQueueItem {
    let state = QueueItemState::parse(&model.state).unwrap_or_else(|| {
        tracing::warn!(book_id = %model.book_id, state = %model.state, "unknown queue state, treating as pending");
        QueueItemState::Pending
    });
    SyncQueueItem {
        id: model.id,
        book_id: model.book_id,
        position: model.position,
        percentage: percentage_from_column(model.percentage),
        enqueued_at: model.enqueued_at,
        state,
        attempts: model.attempts.max(0) as u32,
    }
}
