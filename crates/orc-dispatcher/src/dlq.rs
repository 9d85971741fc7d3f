use anyhow::Context;
use orc_core::{Task, TaskType};
use orc_queue::{Broker, QueueItem};
use orc_store::Store;
use std::sync::Arc;
use uuid::Uuid;

/// Lists DLQ entries, optionally filtered by task type. Drainable by an operator
/// tool").
pub async fn list(store: &Store, task_type: Option<TaskType>, limit: i64) -> anyhow::Result<Vec<Task>> {
    orc_store::tasks::list_dlq(store.pool(), task_type, limit).await
}

/// Operator tool: re-admits a DLQ task by resetting `retry_count` to 0 and re-enqueueing it.
pub async fn requeue(store: &Store, broker: &Arc<Broker>, task_id: Uuid) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let mut tx = store.pool().begin().await?;
    orc_store::tasks::requeue_for_retry(&mut tx, task_id, 0, now, "requeued from dlq by operator")
        .await?;
    tx.commit().await?;

    let task = orc_store::tasks::get(store.pool(), task_id)
        .await?
        .context("task vanished after dlq requeue")?;
    broker
        .requeue(QueueItem {
            task_id,
            task_type: task.task_type,
            priority: task.priority,
            enqueued_at: now,
        })
        .await;
    Ok(())
}
