//! Keyed debounce: scheduling a task for a key replaces the one still waiting for it.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct DebouncedTasks<K> {
    tasks: Arc<Mutex<HashMap<K, Scheduled>>>,
    next_generation: AtomicU64,
}

impl<K> Default for DebouncedTasks<K> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }
}

fn lock<K>(tasks: &Mutex<HashMap<K, Scheduled>>) -> MutexGuard<'_, HashMap<K, Scheduled>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K> DebouncedTasks<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless another task is scheduled for `key` first.
    /// Once a task has started running it is no longer cancellable.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);
        let task_key = key.clone();

        // Held across spawn so the timer cannot fire before its entry exists.
        let mut guard = lock(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut scheduled = lock(&tasks);
                match scheduled.get(&task_key) {
                    Some(current) if current.generation == generation => {
                        scheduled.remove(&task_key);
                    }
                    _ => return,
                }
            }
            task.await;
        });
        if let Some(previous) = guard.insert(key, Scheduled { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the waiting task for `key`. Returns whether one was waiting.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.tasks).remove(key) {
            Some(scheduled) => {
                scheduled.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl<K> Drop for DebouncedTasks<K> {
    fn drop(&mut self) {
        for (_, scheduled) in lock(&self.tasks).drain() {
            scheduled.handle.abort();
        }
    }
}
