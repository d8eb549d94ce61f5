//! Delayed retraction of delivered paid content.
//!
//! A keyed table of pending retractions plus a min-heap work queue, drained by
//! a single loop task. Each key holds at most one live entry: rescheduling
//! bumps its generation, and queue items whose generation no longer matches
//! are dropped when popped. Nothing is persisted.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::platform::ChatApi;

pub const DEFAULT_RETRACTION_DELAY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RetractionKey {
    pub chat_id: i64,
    pub message_id: i64,
}

impl RetractionKey {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetraction {
    pub key: RetractionKey,
    pub fire_at: Instant,
}

#[derive(Default)]
struct State {
    pending: HashMap<RetractionKey, Entry>,
    queue: BinaryHeap<Reverse<(Instant, u64, RetractionKey)>>,
    next_generation: u64,
}

#[derive(Clone, Copy)]
struct Entry {
    fire_at: Instant,
    generation: u64,
}

impl State {
    /// Pop every queue item due at `now` that is still the live entry for its key.
    fn take_due(&mut self, now: Instant) -> Vec<RetractionKey> {
        let mut due = Vec::new();
        while let Some(Reverse((fire_at, generation, key))) = self.queue.peek().copied() {
            if fire_at > now {
                break;
            }
            self.queue.pop();
            match self.pending.get(&key) {
                Some(entry) if entry.generation == generation => {
                    self.pending.remove(&key);
                    due.push(key);
                }
                // Superseded or cancelled.
                _ => {}
            }
        }
        due
    }

    fn next_fire_at(&self) -> Option<Instant> {
        self.queue.peek().map(|Reverse((at, _, _))| *at)
    }
}

struct Inner {
    api: Arc<dyn ChatApi>,
    state: Mutex<State>,
    wake: Notify,
}

/// Owns the retraction table and the loop that drains it.
#[derive(Clone)]
pub struct RetractionScheduler {
    inner: Arc<Inner>,
    task: Arc<AbortHandle>,
}

impl RetractionScheduler {
    /// Create the scheduler and spawn its drain loop on the current runtime.
    pub fn start(api: Arc<dyn ChatApi>) -> Self {
        let inner = Arc::new(Inner {
            api,
            state: Mutex::new(State::default()),
            wake: Notify::new(),
        });
        let task = Arc::new(tokio::spawn(run(Arc::clone(&inner))).abort_handle());
        Self { inner, task }
    }

    /// Schedule deletion of `key` after `delay`, replacing any pending entry
    /// for the same key.
    pub async fn schedule(&self, key: RetractionKey, delay: Duration) -> PendingRetraction {
        let fire_at = Instant::now() + delay;
        {
            let mut state = self.inner.state.lock().await;
            let generation = state.next_generation;
            state.next_generation += 1;
            if state
                .pending
                .insert(key, Entry { fire_at, generation })
                .is_some()
            {
                debug!("Rescheduled retraction for {:?}", key);
            }
            state.queue.push(Reverse((fire_at, generation, key)));
        }
        self.inner.wake.notify_one();
        PendingRetraction { key, fire_at }
    }

    /// Drop a pending retraction. Returns whether one existed.
    pub async fn cancel(&self, key: RetractionKey) -> bool {
        let removed = self.inner.state.lock().await.pending.remove(&key).is_some();
        if removed {
            self.inner.wake.notify_one();
        }
        removed
    }

    pub async fn pending(&self, key: RetractionKey) -> Option<PendingRetraction> {
        self.inner
            .state
            .lock()
            .await
            .pending
            .get(&key)
            .map(|entry| PendingRetraction {
                key,
                fire_at: entry.fire_at,
            })
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop the drain loop. Pending retractions are forfeited.
    pub async fn shutdown(&self) {
        self.task.abort();
        let mut state = self.inner.state.lock().await;
        if !state.pending.is_empty() {
            info!("Dropping {} pending retractions on shutdown", state.pending.len());
        }
        state.pending.clear();
        state.queue.clear();
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        let next = inner.state.lock().await.next_fire_at();
        match next {
            Some(at) => {
                tokio::select! {
                    _ = sleep_until(at) => {}
                    _ = inner.wake.notified() => continue,
                }
            }
            None => {
                inner.wake.notified().await;
                continue;
            }
        }

        let due = inner.state.lock().await.take_due(Instant::now());
        for key in due {
            retract(&inner, key).await;
        }
    }
}

async fn retract(inner: &Inner, key: RetractionKey) {
    match inner.api.delete_message(key.chat_id, key.message_id).await {
        Ok(()) => info!(
            "Retracted message {} in chat {}",
            key.message_id, key.chat_id
        ),
        Err(e) => warn!(
            "Failed to retract message {} in chat {}: {}",
            key.message_id, key.chat_id, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeChatApi;
    use tokio::time::sleep;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay_and_clears_entry() {
        let api = Arc::new(FakeChatApi::new());
        let scheduler = RetractionScheduler::start(api.clone());
        let key = RetractionKey::new(5, 77);

        scheduler.schedule(key, DEFAULT_RETRACTION_DELAY).await;
        assert_eq!(scheduler.len().await, 1);

        sleep(59 * MINUTE).await;
        assert!(api.deletes().is_empty());

        sleep(2 * MINUTE).await;
        assert_eq!(api.deletes(), vec![(5, 77)]);
        assert_eq!(scheduler.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_keeps_single_timer_at_latest_time() {
        let api = Arc::new(FakeChatApi::new());
        let scheduler = RetractionScheduler::start(api.clone());
        let key = RetractionKey::new(5, 77);

        scheduler.schedule(key, 10 * MINUTE).await;
        let latest = scheduler.schedule(key, 30 * MINUTE).await;

        assert_eq!(scheduler.len().await, 1);
        assert_eq!(scheduler.pending(key).await, Some(latest));

        sleep(20 * MINUTE).await;
        assert!(api.deletes().is_empty(), "superseded timer must not fire");

        sleep(11 * MINUTE).await;
        assert_eq!(api.deletes(), vec![(5, 77)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_retraction() {
        let api = Arc::new(FakeChatApi::new());
        let scheduler = RetractionScheduler::start(api.clone());
        let key = RetractionKey::new(1, 2);

        scheduler.schedule(key, MINUTE).await;
        assert!(scheduler.cancel(key).await);
        assert!(!scheduler.cancel(key).await);

        sleep(2 * MINUTE).await;
        assert!(api.deletes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_retraction_is_dropped() {
        let api = Arc::new(FakeChatApi::new());
        api.fail_deletes();
        let scheduler = RetractionScheduler::start(api.clone());

        scheduler.schedule(RetractionKey::new(1, 2), MINUTE).await;
        sleep(5 * MINUTE).await;

        assert_eq!(api.deletes(), vec![(1, 2)]);
        assert_eq!(scheduler.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_fire_in_order() {
        let api = Arc::new(FakeChatApi::new());
        let scheduler = RetractionScheduler::start(api.clone());

        scheduler.schedule(RetractionKey::new(1, 20), 2 * MINUTE).await;
        scheduler.schedule(RetractionKey::new(1, 10), MINUTE).await;
        sleep(3 * MINUTE).await;

        assert_eq!(api.deletes(), vec![(1, 10), (1, 20)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_forfeits_pending() {
        let api = Arc::new(FakeChatApi::new());
        let scheduler = RetractionScheduler::start(api.clone());

        scheduler.schedule(RetractionKey::new(1, 2), MINUTE).await;
        scheduler.shutdown().await;
        sleep(2 * MINUTE).await;

        assert!(api.deletes().is_empty());
        assert_eq!(scheduler.len().await, 0);
    }

    #[test]
    fn test_take_due_skips_superseded_entries() {
        let now = Instant::now();
        let key = RetractionKey::new(1, 1);
        let mut state = State::default();
        state.queue.push(Reverse((now, 0, key)));
        state.queue.push(Reverse((now, 1, key)));
        state.pending.insert(
            key,
            Entry {
                fire_at: now,
                generation: 1,
            },
        );

        assert_eq!(state.take_due(now), vec![key]);
        assert!(state.pending.is_empty());
        assert!(state.queue.is_empty());
    }
}
