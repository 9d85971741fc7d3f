use anyhow::Context;
use chrono::{DateTime, Utc};
use orc_core::{OutboxEntry, OutboxStatus};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// Appends an outbox row in the same transaction as the task-status write that produced it, so
/// a crash between the two is impossible; side effects are written ahead of delivery.
pub async fn enqueue(
    tx: &mut Transaction<'_, Postgres>,
    task_id: Uuid,
    effect_type: &str,
    target: &str,
    payload: &Value,
    max_retries: i32,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO orc.outbox (id, task_id, effect_type, target, payload, max_retries)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(effect_type)
    .bind(target)
    .bind(payload)
    .bind(max_retries)
    .execute(&mut **tx)
    .await
    .context("enqueue outbox entry")?;
    Ok(id)
}

/// Claims up to `limit` pending rows for delivery, skipping rows another relay worker already
/// has locked. Uses the `FOR UPDATE SKIP LOCKED` drain pattern so multiple relay
/// instances can run concurrently without double-delivering.
pub async fn claim_batch(
    tx: &mut Transaction<'_, Postgres>,
    limit: i64,
) -> anyhow::Result<Vec<OutboxEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, task_id, effect_type, target, payload, status, retry_count, max_retries,
               created_at, delivered_at, last_error
        FROM orc.outbox
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(limit)
    .fetch_all(&mut **tx)
    .await
    .context("claim outbox batch")?;

    rows.into_iter().map(row_to_entry).collect()
}

pub async fn mark_delivered(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    delivered_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE orc.outbox SET status = 'delivered', delivered_at = $2 WHERE id = $1"#,
    )
    .bind(id)
    .bind(delivered_at)
    .execute(&mut **tx)
    .await
    .context("mark outbox entry delivered")?;
    Ok(())
}

/// Records a failed delivery attempt. Callers decide terminal-vs-retry by comparing the returned
/// `retry_count` against `max_retries`; this just increments and timestamps.
pub async fn mark_attempt_failed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    last_error: &str,
    terminal: bool,
) -> anyhow::Result<()> {
    let status = if terminal { "failed" } else { "pending" };
    sqlx::query(
        r#"
        UPDATE orc.outbox
        SET status = $2, retry_count = retry_count + 1, last_error = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(last_error)
    .execute(&mut **tx)
    .await
    .context("mark outbox attempt failed")?;
    Ok(())
}

/// Deletes delivered rows older than `older_than`, keeping the table from growing unbounded
/// Delivered entries are retained 7 days then purged.
pub async fn purge_delivered(pool: &PgPool, older_than: DateTime<Utc>) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"DELETE FROM orc.outbox WHERE status = 'delivered' AND delivered_at < $1"#,
    )
    .bind(older_than)
    .execute(pool)
    .await
    .context("purge delivered outbox entries")?;
    Ok(result.rows_affected())
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> anyhow::Result<OutboxEntry> {
    let status: String = row.try_get("status")?;
    Ok(OutboxEntry {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        effect_type: row.try_get("effect_type")?,
        target: row.try_get("target")?,
        payload: row.try_get("payload")?,
        status: match status.as_str() {
            "pending" => OutboxStatus::Pending,
            "delivered" => OutboxStatus::Delivered,
            _ => OutboxStatus::Failed,
        },
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        created_at: row.try_get("created_at")?,
        delivered_at: row.try_get("delivered_at")?,
        last_error: row.try_get("last_error")?,
    })
}
