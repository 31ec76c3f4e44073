//! In-memory doubles for the storage and remote seams.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::{
    domain::{ProgressRecord, QueueItemState, SyncQueueItem},
    remote_client::RemoteProgress,
    storage::{ProgressStore, SyncQueue},
};

#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<String, ProgressRecord>>,
    history: Mutex<Vec<ProgressRecord>>,
    failing: AtomicBool,
}

impl MemoryProgressStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn record(&self, book_id: &str) -> Option<ProgressRecord> {
        self.records.lock().unwrap().get(book_id).cloned()
    }

    pub fn insert(&self, record: ProgressRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.book_id.clone(), record);
    }

    /// Applied writes for one book, oldest first.
    pub fn history(&self, book_id: &str) -> Vec<ProgressRecord> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.book_id == book_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        Ok(self.record(book_id))
    }

    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn write(&self, record: &ProgressRecord) -> anyhow::Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("quota exceeded");
        }
        anyhow::ensure!(record.is_consistent(), "inconsistent record");
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(&record.book_id) {
            if !existing.accepts(record.percentage) {
                return Ok(false);
            }
        }
        records.insert(record.book_id.clone(), record.clone());
        self.history.lock().unwrap().push(record.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemorySyncQueue {
    items: Mutex<HashMap<String, SyncQueueItem>>,
}

impl MemorySyncQueue {
    pub fn item(&self, book_id: &str) -> Option<SyncQueueItem> {
        self.items.lock().unwrap().get(book_id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }

    fn update_by_id(&self, id: Uuid, f: impl FnOnce(&mut SyncQueueItem) -> bool) -> bool {
        let mut items = self.items.lock().unwrap();
        items
            .values_mut()
            .find(|item| item.id == id)
            .map(f)
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl SyncQueue for MemorySyncQueue {
    async fn enqueue(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<SyncQueueItem> {
        let item = SyncQueueItem::new(book_id, position.map(str::to_owned), percentage);
        self.items
            .lock()
            .unwrap()
            .insert(book_id.to_owned(), item.clone());
        Ok(item)
    }

    async fn dequeue(&self, book_id: &str) -> anyhow::Result<bool> {
        Ok(self.items.lock().unwrap().remove(book_id).is_some())
    }

    async fn get(&self, book_id: &str) -> anyhow::Result<Option<SyncQueueItem>> {
        Ok(self.item(book_id))
    }

    async fn list(&self) -> anyhow::Result<Vec<SyncQueueItem>> {
        let mut items: Vec<_> = self.items.lock().unwrap().values().cloned().collect();
        items.sort_by_key(|item| item.enqueued_at);
        Ok(items)
    }

    async fn begin(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.update_by_id(id, |item| {
            if item.state != QueueItemState::Pending {
                return false;
            }
            item.state = QueueItemState::InFlight;
            true
        }))
    }

    async fn complete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|_, item| item.id != id);
        Ok(items.len() < before)
    }

    async fn fail(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.update_by_id(id, |item| {
            if item.state != QueueItemState::InFlight {
                return false;
            }
            item.state = QueueItemState::Pending;
            item.attempts += 1;
            true
        }))
    }

    async fn recover_in_flight(&self) -> anyhow::Result<u64> {
        let mut recovered = 0;
        for item in self.items.lock().unwrap().values_mut() {
            if item.state == QueueItemState::InFlight {
                item.state = QueueItemState::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn clear(&self) -> anyhow::Result<u64> {
        let mut items = self.items.lock().unwrap();
        let count = items.len() as u64;
        items.clear();
        Ok(count)
    }
}

/// Remote service double. Starts authorised and healthy.
pub struct FakeRemote {
    records: Mutex<HashMap<String, ProgressRecord>>,
    upserts: Mutex<Vec<(String, Option<String>, u8)>>,
    get_calls: AtomicUsize,
    failing: AtomicBool,
    authorized: AtomicBool,
    held: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            authorized: AtomicBool::new(true),
            held: Mutex::new(None),
        }
    }
}

impl FakeRemote {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub fn insert(&self, record: ProgressRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.book_id.clone(), record);
    }

    pub fn upserts(&self) -> Vec<(String, Option<String>, u8)> {
        self.upserts.lock().unwrap().clone()
    }

    /// The next upsert waits until the returned handle is notified.
    pub fn hold_next_upsert(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.held.lock().unwrap() = Some(Arc::clone(&release));
        release
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteProgress for FakeRemote {
    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    async fn get_one(&self, book_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.records.lock().unwrap().get(book_id).cloned())
    }

    async fn get_all(&self) -> anyhow::Result<Vec<ProgressRecord>> {
        self.check()?;
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn upsert(
        &self,
        book_id: &str,
        position: Option<&str>,
        percentage: u8,
    ) -> anyhow::Result<ProgressRecord> {
        let held = self.held.lock().unwrap().take();
        if let Some(release) = held {
            release.notified().await;
        }
        self.check()?;
        self.upserts.lock().unwrap().push((
            book_id.to_owned(),
            position.map(str::to_owned),
            percentage,
        ));
        let record = ProgressRecord::new(
            book_id,
            position.map(str::to_owned),
            percentage,
            Utc::now(),
        );
        self.insert(record.clone());
        Ok(record)
    }

    async fn delete(&self, book_id: &str) -> anyhow::Result<()> {
        self.check()?;
        self.records.lock().unwrap().remove(book_id);
        Ok(())
    }
}
