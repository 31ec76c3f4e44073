use chrono::{DateTime, Utc};
use poem_openapi::{ApiResponse, Enum, Object, payload::Json};
use uuid::Uuid;

use crate::{
    domain::{DrainReport, ProgressRecord, ProgressSource, ResolvedPosition, SyncQueueItem},
    restoration::SeekRetryPolicy,
};

#[derive(Debug, Clone, Object)]
pub struct ErrorDto {
    /// Human-readable error message
    pub message: String,
}

impl From<String> for ErrorDto {
    fn from(message: String) -> Self {
        ErrorDto { message }
    }
}

// ===== Renderer-facing DTOs =====

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct PositionChangedDto {
    /// Opaque renderer location token
    pub position: String,
    /// Progress through the book, 0.0 - 1.0
    pub fraction: f64,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct PositionAckDto {
    /// False when the event was below the book's high-water mark and discarded
    pub accepted: bool,
    pub high_water_mark: Option<u8>,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct ProgressRecordDto {
    pub book_id: String,
    pub position: Option<String>,
    pub percentage: u8,
    pub last_updated_at: DateTime<Utc>,
}

impl From<ProgressRecord> for ProgressRecordDto {
    fn from(r: ProgressRecord) -> Self {
        ProgressRecordDto {
            book_id: r.book_id,
            position: r.position,
            percentage: r.percentage,
            last_updated_at: r.last_updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[oai(rename_all = "lowercase")]
pub enum ProgressSourceDto {
    Local,
    Remote,
    Empty,
}

impl From<ProgressSource> for ProgressSourceDto {
    fn from(s: ProgressSource) -> Self {
        match s {
            ProgressSource::Local => ProgressSourceDto::Local,
            ProgressSource::Remote => ProgressSourceDto::Remote,
            ProgressSource::Empty => ProgressSourceDto::Empty,
        }
    }
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct ResolvedPositionDto {
    pub book_id: String,
    /// Where the renderer should seek; absent means start of book
    pub position: Option<String>,
    pub percentage: u8,
    pub source: ProgressSourceDto,
    /// How the renderer should retry the seek if it is not ready yet
    pub seek_retry: SeekRetryDto,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct SeekRetryDto {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl From<SeekRetryPolicy> for SeekRetryDto {
    fn from(p: SeekRetryPolicy) -> Self {
        SeekRetryDto {
            max_attempts: p.max_attempts,
            interval_ms: p.interval.as_millis() as u64,
        }
    }
}

impl ResolvedPositionDto {
    pub fn new(r: ResolvedPosition, retry: SeekRetryPolicy) -> Self {
        ResolvedPositionDto {
            book_id: r.book_id,
            position: r.position,
            percentage: r.percentage,
            source: r.source.into(),
            seek_retry: retry.into(),
        }
    }
}

// ===== Platform-facing DTOs =====

#[derive(Debug, Clone, Object)]
pub struct ConnectivityDto {
    pub online: bool,
}

#[derive(Debug, Clone, Object)]
pub struct VisibilityDto {
    pub visible: bool,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct ConnectivityStateDto {
    pub online: bool,
    /// Whether this notification started a queue drain
    pub reconnect_triggered: bool,
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct QueueItemDto {
    pub id: Uuid,
    pub book_id: String,
    pub position: Option<String>,
    pub percentage: u8,
    pub enqueued_at: DateTime<Utc>,
    pub state: String,
    pub attempts: u32,
}

impl From<SyncQueueItem> for QueueItemDto {
    fn from(item: SyncQueueItem) -> Self {
        QueueItemDto {
            id: item.id,
            book_id: item.book_id,
            position: item.position,
            percentage: item.percentage,
            enqueued_at: item.enqueued_at,
            state: item.state.as_str().to_owned(),
            attempts: item.attempts,
        }
    }
}

#[derive(Debug, Clone, Object)]
pub struct DrainReportDto {
    pub delivered: u64,
    pub superseded: u64,
    pub failed: u64,
}

impl From<DrainReport> for DrainReportDto {
    fn from(r: DrainReport) -> Self {
        DrainReportDto {
            delivered: r.delivered as u64,
            superseded: r.superseded as u64,
            failed: r.failed as u64,
        }
    }
}

#[derive(Debug, Clone, Object)]
#[oai(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: String,
    pub online: bool,
    pub remote_authorized: bool,
    /// None when the queue could not be read
    pub pending_sync: Option<u64>,
}

// ===== Responses =====

#[derive(ApiResponse)]
pub enum PositionResponseDto {
    /// Event handled; saves are scheduled in the background
    #[oai(status = 202)]
    Accepted(Json<PositionAckDto>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ResolveResponseDto {
    /// Starting position for the book
    #[oai(status = 200)]
    Ok(Json<ResolvedPositionDto>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ProgressListResponseDto {
    #[oai(status = 200)]
    Ok(Json<Vec<ProgressRecordDto>>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ProgressGetResponseDto {
    #[oai(status = 200)]
    Ok(Json<ProgressRecordDto>),

    #[oai(status = 404)]
    NotFound(Json<ErrorDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum ConnectivityResponseDto {
    #[oai(status = 200)]
    Ok(Json<ConnectivityStateDto>),
}

#[derive(ApiResponse)]
pub enum QueueListResponseDto {
    #[oai(status = 200)]
    Ok(Json<Vec<QueueItemDto>>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(Debug, Clone, Object)]
pub struct QueueClearedDto {
    pub removed: u64,
}

#[derive(ApiResponse)]
pub enum QueueClearResponseDto {
    #[oai(status = 200)]
    Ok(Json<QueueClearedDto>),

    /// Local store error
    #[oai(status = 500)]
    InternalError(Json<ErrorDto>),
}

#[derive(ApiResponse)]
pub enum DrainResponseDto {
    #[oai(status = 200)]
    Ok(Json<DrainReportDto>),
}

#[derive(ApiResponse)]
pub enum HealthResponseDto {
    #[oai(status = 200)]
    Ok(Json<HealthDto>),
}

#[derive(ApiResponse)]
pub enum NoContentResponseDto {
    /// Empty 204 response
    #[oai(status = 204)]
    NoContent,

    #[oai(status = 400)]
    BadRequest(Json<ErrorDto>),
}
