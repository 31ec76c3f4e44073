// Domain models shared by the stores, the coordinator and the restoration service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The furthest known reading position of one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub book_id: String,
    /// Opaque renderer token; only `None` while `percentage` is 0.
    pub position: Option<String>,
    /// 0 - 100
    pub percentage: u8,
    pub last_updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(
        book_id: impl Into<String>,
        position: Option<String>,
        percentage: u8,
        last_updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            position,
            percentage: percentage.min(100),
            last_updated_at,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.percentage <= 100 && (self.position.is_some() || self.percentage == 0)
    }

    /// A write never lowers the stored percentage; equal percentages still refresh
    /// the position and timestamp.
    pub fn accepts(&self, percentage: u8) -> bool {
        percentage >= self.percentage
    }

    /// Whether `self` should win over `other` in a conflict. Later `last_updated_at` wins.
    pub fn is_fresher_than(&self, other: &ProgressRecord) -> bool {
        self.last_updated_at > other.last_updated_at
    }

    /// Same place and completion, ignoring timestamps.
    pub fn same_progress(&self, other: &ProgressRecord) -> bool {
        self.position == other.position && self.percentage == other.percentage
    }
}

/// Lifecycle of a queued remote update. Acknowledged items are deleted, not marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemState {
    Pending,
    InFlight,
}

impl QueueItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemState::Pending => entities::sync_queue_item::STATE_PENDING,
            QueueItemState::InFlight => entities::sync_queue_item::STATE_IN_FLIGHT,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            entities::sync_queue_item::STATE_PENDING => Some(QueueItemState::Pending),
            entities::sync_queue_item::STATE_IN_FLIGHT => Some(QueueItemState::InFlight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub book_id: String,
    pub position: Option<String>,
    pub percentage: u8,
    pub enqueued_at: DateTime<Utc>,
    pub state: QueueItemState,
    /// Failed dispatches so far
    pub attempts: u32,
}

impl SyncQueueItem {
    pub fn new(book_id: impl Into<String>, position: Option<String>, percentage: u8) -> Self {
        Self {
            id: Uuid::now_v7(),
            book_id: book_id.into(),
            position,
            percentage: percentage.min(100),
            enqueued_at: Utc::now(),
            state: QueueItemState::Pending,
            attempts: 0,
        }
    }
}

/// Where a restored starting position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    Local,
    Remote,
    /// Neither side had a record; the book starts from the beginning.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPosition {
    pub book_id: String,
    pub position: Option<String>,
    pub percentage: u8,
    pub source: ProgressSource,
}

impl ResolvedPosition {
    pub fn empty(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            position: None,
            percentage: 0,
            source: ProgressSource::Empty,
        }
    }

    pub fn from_record(record: &ProgressRecord, source: ProgressSource) -> Self {
        Self {
            book_id: record.book_id.clone(),
            position: record.position.clone(),
            percentage: record.percentage,
            source,
        }
    }
}

/// Outcome of dispatching one queued item during a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// Newer progress was already acknowledged; the item is dropped without a request.
    Superseded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub superseded: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Superseded => self.superseded += 1,
            DispatchOutcome::Failed => self.failed += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delivered + self.superseded + self.failed == 0
    }
}

/// Renderer fractions (0.0 - 1.0) become whole percentages, rounded half away from zero.
pub fn percentage_from_fraction(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fraction_rounds_to_percentage() {
        assert_eq!(percentage_from_fraction(0.12), 12);
        assert_eq!(percentage_from_fraction(0.125), 13);
        assert_eq!(percentage_from_fraction(0.004), 0);
        assert_eq!(percentage_from_fraction(1.0), 100);
    }

    #[test]
    fn fraction_out_of_range_is_clamped() {
        assert_eq!(percentage_from_fraction(-0.3), 0);
        assert_eq!(percentage_from_fraction(1.7), 100);
        assert_eq!(percentage_from_fraction(f64::NAN), 0);
        assert_eq!(percentage_from_fraction(f64::INFINITY), 0);
    }

    #[test]
    fn record_accepts_equal_or_higher_percentage() {
        let rec = ProgressRecord::new("b1", Some("loc".into()), 40, Utc::now());
        assert!(rec.accepts(40));
        assert!(rec.accepts(41));
        assert!(!rec.accepts(39));
    }

    #[test]
    fn null_position_only_allowed_at_zero() {
        assert!(ProgressRecord::new("b1", None, 0, Utc::now()).is_consistent());
        assert!(!ProgressRecord::new("b1", None, 5, Utc::now()).is_consistent());
    }

    #[test]
    fn freshness_ignores_percentage() {
        let now = Utc::now();
        let older = ProgressRecord::new("b1", Some("a".into()), 90, now - Duration::seconds(100));
        let newer = ProgressRecord::new("b1", Some("b".into()), 10, now);
        assert!(newer.is_fresher_than(&older));
        assert!(!older.is_fresher_than(&newer));
        assert!(!newer.is_fresher_than(&newer.clone()));
    }

    #[test]
    fn queue_items_get_distinct_ids() {
        let a = SyncQueueItem::new("b1", Some("x".into()), 10);
        let b = SyncQueueItem::new("b1", Some("x".into()), 10);
        assert_ne!(a.id, b.id);
        assert_eq!(a.state, QueueItemState::Pending);
    }
}
