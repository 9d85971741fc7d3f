use chrono::{DateTime, Utc};
use orc_core::TaskType;
use uuid::Uuid;

/// An entry on the priority queue. Ordering is `(priority_bucket, enqueued_at)` ascending —
/// lower `priority` first, ties broken by FIFO enqueue order.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_at == other.enqueued_at
    }
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, self.enqueued_at).cmp(&(other.priority, other.enqueued_at))
    }
}
