use crate::error::QueueError;
use crate::heap::QueueItem;
use chrono::{DateTime, Utc};
use orc_core::TaskType;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    /// `TASK_LEASE_SECONDS`, default 900.
    pub lease_seconds: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { lease_seconds: 900 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lease {
    pub task_id: Uuid,
    pub token: Uuid,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    token: Uuid,
    expires_at: DateTime<Utc>,
}

struct State {
    heap: BinaryHeap<Reverse<QueueItem>>,
    locks: HashMap<Uuid, LockEntry>,
    depth: i64,
    throughput: HashMap<TaskType, u64>,
}

/// The in-process Queue Broker: priority dequeue with blocking wait, per-task TTL locks, and
/// depth/throughput counters. One instance is shared behind an `Arc` across the
/// worker pool within a process.
pub struct Broker {
    state: Mutex<State>,
    notify: Notify,
    config: BrokerConfig,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                locks: HashMap::new(),
                depth: 0,
                throughput: HashMap::new(),
            }),
            notify: Notify::new(),
            config,
        }
    }

    pub async fn enqueue(&self, item: QueueItem) {
        let mut state = self.state.lock().await;
        state.depth += 1;
        state.heap.push(Reverse(item));
        drop(state);
        self.notify.notify_one();
    }

    pub async fn depth(&self) -> i64 {
        self.state.lock().await.depth
    }

    pub async fn throughput(&self, task_type: TaskType) -> u64 {
        self.state
            .lock()
            .await
            .throughput
            .get(&task_type)
            .copied()
            .unwrap_or(0)
    }

    /// Blocking dequeue. Pops the minimum `(priority, enqueued_at)` item and acquires its lock
    /// under a fresh token, retrying the next item if the lock acquisition races. If
    /// nothing becomes available within `max_wait`, returns `None`.
    pub async fn lease_next(&self, consumer_id: &str, max_wait: Duration) -> Option<Lease> {
        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(lease) = self.try_lease_once(consumer_id).await {
                return Some(lease);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let remaining = (deadline - now).min(Duration::from_millis(200));
            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    async fn try_lease_once(&self, consumer_id: &str) -> Option<Lease> {
        let mut state = self.state.lock().await;
        while let Some(Reverse(item)) = state.heap.pop() {
            state.depth -= 1;
            let now = Utc::now();

            if let Some(existing) = state.locks.get(&item.task_id) {
                if existing.expires_at > now {
                    // Still genuinely held (stale re-enqueue racing an in-flight lease).
                    // Drop this duplicate and try the next item.
                    continue;
                }
            }

            let token = Uuid::new_v4();
            let expires_at = now + chrono::Duration::seconds(self.config.lease_seconds);
            state.locks.insert(item.task_id, LockEntry { token, expires_at });
            *state.throughput.entry(item.task_type).or_insert(0) += 1;
            tracing::debug!(consumer_id, task_id = %item.task_id, "leased task");
            return Some(Lease {
                task_id: item.task_id,
                token,
            });
        }
        None
    }

    /// Extends a held lock's TTL iff `token` still matches.
    pub async fn extend_lease(
        &self,
        task_id: Uuid,
        token: Uuid,
        seconds: i64,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.locks.get_mut(&task_id) {
            Some(entry) if entry.token == token => {
                entry.expires_at = Utc::now() + chrono::Duration::seconds(seconds);
                Ok(())
            }
            _ => Err(QueueError::LeaseLost),
        }
    }

    /// Releases a held lock iff `token` still matches.
    pub async fn release(&self, task_id: Uuid, token: Uuid) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state.locks.get(&task_id) {
            Some(entry) if entry.token == token => {
                state.locks.remove(&task_id);
                Ok(())
            }
            _ => Err(QueueError::LeaseLost),
        }
    }

    /// Re-admits a task after a retryable failure, at its original priority but with the
    /// backoff-delayed effective enqueue time.
    pub async fn requeue(&self, item: QueueItem) {
        self.enqueue(item).await;
    }

    async fn sweep_expired_locks(&self) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.locks.retain(|_, entry| entry.expires_at > now);
    }

    /// Background hygiene loop freeing lock-table entries past their TTL. Tasks behind an
    /// expired lock are reclaimed at the Durable Store level by the dispatcher's lease reaper,
    /// not here — this loop only keeps the in-memory table from growing unbounded.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_expired_locks().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(task_id: Uuid, priority: i32, enqueued_at: DateTime<Utc>) -> QueueItem {
        QueueItem {
            task_id,
            task_type: TaskType::GenContent,
            priority,
            enqueued_at,
        }
    }

    #[tokio::test]
    async fn lower_priority_bucket_dequeues_first() {
        let broker = Broker::new(BrokerConfig::default());
        let now = Utc::now();
        let low_priority_task = Uuid::new_v4();
        let high_priority_task = Uuid::new_v4();

        broker.enqueue(item(low_priority_task, 100, now)).await;
        broker.enqueue(item(high_priority_task, 10, now)).await;

        let lease = broker
            .lease_next("test", Duration::from_millis(50))
            .await
            .expect("item available");
        assert_eq!(lease.task_id, high_priority_task);
    }

    #[tokio::test]
    async fn same_bucket_is_fifo_by_enqueue_time() {
        let broker = Broker::new(BrokerConfig::default());
        let now = Utc::now();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        broker.enqueue(item(second, 50, now + chrono::Duration::seconds(1))).await;
        broker.enqueue(item(first, 50, now)).await;

        let lease = broker
            .lease_next("test", Duration::from_millis(50))
            .await
            .expect("item available");
        assert_eq!(lease.task_id, first);
    }

    #[tokio::test]
    async fn lease_next_times_out_when_empty() {
        let broker = Broker::new(BrokerConfig::default());
        let lease = broker.lease_next("test", Duration::from_millis(30)).await;
        assert!(lease.is_none());
    }

    #[tokio::test]
    async fn extend_lease_rejects_mismatched_token() {
        let broker = Broker::new(BrokerConfig::default());
        let task_id = Uuid::new_v4();
        broker.enqueue(item(task_id, 10, Utc::now())).await;
        let lease = broker
            .lease_next("test", Duration::from_millis(50))
            .await
            .unwrap();

        let result = broker.extend_lease(task_id, Uuid::new_v4(), 60).await;
        assert_eq!(result, Err(QueueError::LeaseLost));

        let result = broker.extend_lease(task_id, lease.token, 60).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn release_frees_the_lock_for_the_next_leaser() {
        let broker = Broker::new(BrokerConfig::default());
        let task_id = Uuid::new_v4();
        broker.enqueue(item(task_id, 10, Utc::now())).await;
        let lease = broker
            .lease_next("test", Duration::from_millis(50))
            .await
            .unwrap();

        broker.release(task_id, lease.token).await.unwrap();

        broker.enqueue(item(task_id, 10, Utc::now())).await;
        let second_lease = broker
            .lease_next("test", Duration::from_millis(50))
            .await
            .unwrap();
        assert_ne!(second_lease.token, lease.token);
    }

    #[tokio::test]
    async fn enqueue_bumps_depth_and_lease_drains_it() {
        let broker = Broker::new(BrokerConfig::default());
        broker.enqueue(item(Uuid::new_v4(), 10, Utc::now())).await;
        assert_eq!(broker.depth().await, 1);

        broker.lease_next("test", Duration::from_millis(50)).await;
        assert_eq!(broker.depth().await, 0);
    }
}
