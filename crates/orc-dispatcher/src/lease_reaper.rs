use orc_core::{RunMetrics, RunStatus};
use orc_queue::{Broker, QueueItem};
use orc_store::Store;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Reclaims tasks whose lease expired without a heartbeat (crashed or stalled worker). Treated as
/// a retryable timeout: moved back to `queued` and re-admitted to the Queue Broker unless
/// `retry_count` has already reached `max_retries`, in which case the task is routed to the DLQ
/// instead. Either way, the orphaned `started` run left behind by the dead worker is finalized
/// as `RunStatus::Timeout` so it doesn't linger forever.
pub async fn run(store: Store, broker: Arc<Broker>, poll: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        if let Err(err) = reap_once(&store, &broker).await {
            tracing::warn!(error = %err, "lease reaper error");
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = shutdown_rx.changed() => {}
        }
    }
}

async fn reap_once(store: &Store, broker: &Arc<Broker>) -> anyhow::Result<()> {
    let mut tx = store.pool().begin().await?;

    let rows = sqlx::query(
        r#"
        SELECT id, task_type, priority, retry_count, max_retries
        FROM orc.tasks
        WHERE status = 'running' AND lease_deadline IS NOT NULL AND lease_deadline < now()
        ORDER BY lease_deadline
        LIMIT 50
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .fetch_all(&mut *tx)
    .await?;

    let mut reclaimed = Vec::with_capacity(rows.len());
    for row in rows {
        let task_id: Uuid = row.try_get("id")?;
        let task_type_raw: String = row.try_get("task_type")?;
        let priority: i32 = row.try_get("priority")?;
        let retry_count: i32 = row.try_get("retry_count")?;
        let max_retries: i32 = row.try_get("max_retries")?;

        let now = chrono::Utc::now();
        let error = "lease expired without heartbeat";
        let new_retry_count = retry_count + 1;

        if let Some(run_id) = orc_store::runs::lock_started_for_task(&mut tx, task_id).await? {
            orc_store::runs::finish(&mut tx, run_id, now, RunStatus::Timeout, &RunMetrics::default(), Some(error))
                .await?;
        }

        if new_retry_count >= max_retries {
            orc_store::tasks::mark_failed_exhausted(&mut tx, task_id, new_retry_count, now, error).await?;
            tracing::warn!(task_id = %task_id, "lease expired, retries exhausted, moved to dlq");
            continue;
        }

        orc_store::tasks::requeue_for_retry(&mut tx, task_id, new_retry_count, now, error).await?;

        if let Ok(task_type) = task_type_raw.parse() {
            reclaimed.push(QueueItem {
                task_id,
                task_type,
                priority,
                enqueued_at: now,
            });
        }
    }

    tx.commit().await?;

    for item in reclaimed {
        tracing::info!(task_id = %item.task_id, "reclaimed expired lease");
        broker.requeue(item).await;
    }

    Ok(())
}
