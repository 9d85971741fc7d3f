use anyhow::Context;
use chrono::{DateTime, Utc};
use orc_core::{Task, TaskStatus, TaskType};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

pub struct NewTask {
    pub id: Uuid,
    pub task_type: TaskType,
    pub payload: Value,
    pub priority: i32,
    pub max_retries: i32,
    pub idempotency_key: Option<String>,
    pub trace_id: Option<Uuid>,
}

/// Result of attempting to create a task under an idempotency key.
pub enum SubmitOutcome {
    /// A new task row was created.
    Created(Task),
    /// `idempotency_key` already mapped to an existing task; no row was created.
    Existing(Task),
}

/// Insert a new task, honoring the idempotency key uniqueness invariant.
///
/// Takes a transaction so callers (e.g. the webhook handler) can create the task in the same
/// transaction as the inbox row that triggered it. A race that loses the unique-index insert
/// falls back to a lookup by key, so concurrent submissions with the same key always converge
/// on one task id.
pub async fn submit(
    tx: &mut Transaction<'_, Postgres>,
    new_task: NewTask,
) -> anyhow::Result<SubmitOutcome> {
    if let Some(key) = &new_task.idempotency_key {
        if let Some(existing) = get_by_idempotency_key_tx(tx, key).await? {
            return Ok(SubmitOutcome::Existing(existing));
        }
    }

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO orc.tasks (
            id, task_type, payload, priority, status, retry_count, max_retries,
            idempotency_key, trace_id, enqueued_at, updated_at
        )
        VALUES ($1, $2, $3, $4, 'queued', 0, $5, $6, $7, $8, $8)
        ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
        "#,
    )
    .bind(new_task.id)
    .bind(new_task.task_type.as_str())
    .bind(&new_task.payload)
    .bind(new_task.priority)
    .bind(new_task.max_retries)
    .bind(&new_task.idempotency_key)
    .bind(new_task.trace_id)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("insert task")?;

    if inserted.rows_affected() == 1 {
        let task = get_tx(tx, new_task.id)
            .await?
            .context("task vanished immediately after insert")?;
        return Ok(SubmitOutcome::Created(task));
    }

    // Lost the race on the unique index: another submitter's row won. ABA-safe fallback.
    let key = new_task
        .idempotency_key
        .as_ref()
        .context("conflict on insert without idempotency_key")?;
    let existing = get_by_idempotency_key_tx(tx, key)
        .await?
        .context("idempotency_key conflict but no row found")?;
    Ok(SubmitOutcome::Existing(existing))
}

pub async fn get(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT id, task_type, payload, priority, status, retry_count, max_retries,
               idempotency_key, trace_id, enqueued_at, started_at, completed_at,
               last_error, lease_deadline
        FROM orc.tasks WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch task by id")?;

    row.map(row_to_task).transpose()
}

pub async fn get_by_idempotency_key(pool: &PgPool, key: &str) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT id, task_type, payload, priority, status, retry_count, max_retries,
               idempotency_key, trace_id, enqueued_at, started_at, completed_at,
               last_error, lease_deadline
        FROM orc.tasks WHERE idempotency_key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("fetch task by idempotency_key")?;

    row.map(row_to_task).transpose()
}

async fn get_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT id, task_type, payload, priority, status, retry_count, max_retries,
               idempotency_key, trace_id, enqueued_at, started_at, completed_at,
               last_error, lease_deadline
        FROM orc.tasks WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("fetch task by id")?;

    row.map(row_to_task).transpose()
}

async fn get_by_idempotency_key_tx(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
) -> anyhow::Result<Option<Task>> {
    let row = sqlx::query(
        r#"
        SELECT id, task_type, payload, priority, status, retry_count, max_retries,
               idempotency_key, trace_id, enqueued_at, started_at, completed_at,
               last_error, lease_deadline
        FROM orc.tasks WHERE idempotency_key = $1
        "#,
    )
    .bind(key)
    .fetch_optional(&mut **tx)
    .await
    .context("fetch task by idempotency_key")?;

    row.map(row_to_task).transpose()
}

/// Count of tasks currently admitted but not yet finished, used by the admission controller's
/// queue-depth cap. Backed by the store rather than the in-memory broker counter so
/// admission stays correct across worker restarts.
pub async fn active_count(pool: &PgPool) -> anyhow::Result<i64> {
    let row = sqlx::query(
        r#"SELECT count(*) AS n FROM orc.tasks WHERE status IN ('queued', 'running')"#,
    )
    .fetch_one(pool)
    .await
    .context("count active tasks")?;
    Ok(row.try_get::<i64, _>("n")?)
}

/// DLQ listing: tasks that exhausted `max_retries`. There is no separate DLQ
/// table — a failed task with `retry_count >= max_retries` is the DLQ entry.
pub async fn list_dlq(
    pool: &PgPool,
    task_type: Option<TaskType>,
    limit: i64,
) -> anyhow::Result<Vec<Task>> {
    let rows = sqlx::query(
        r#"
        SELECT id, task_type, payload, priority, status, retry_count, max_retries,
               idempotency_key, trace_id, enqueued_at, started_at, completed_at,
               last_error, lease_deadline
        FROM orc.tasks
        WHERE status = 'failed' AND retry_count >= max_retries
          AND ($1::text IS NULL OR task_type = $1)
        ORDER BY completed_at DESC NULLS LAST
        LIMIT $2
        "#,
    )
    .bind(task_type.map(|t| t.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list dlq tasks")?;

    rows.into_iter().map(row_to_task).collect()
}

pub async fn mark_running(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    started_at: DateTime<Utc>,
    lease_deadline: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.tasks
        SET status = 'running', started_at = $2, lease_deadline = $3, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(started_at)
    .bind(lease_deadline)
    .execute(&mut **tx)
    .await
    .context("mark task running")?;
    Ok(())
}

pub async fn mark_done(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    completed_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.tasks
        SET status = 'done', completed_at = $2, lease_deadline = NULL, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(completed_at)
    .execute(&mut **tx)
    .await
    .context("mark task done")?;
    Ok(())
}

pub async fn mark_failed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    completed_at: DateTime<Utc>,
    last_error: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.tasks
        SET status = 'failed', completed_at = $2, lease_deadline = NULL,
            last_error = $3, updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(completed_at)
    .bind(last_error)
    .execute(&mut **tx)
    .await
    .context("mark task failed")?;
    Ok(())
}

/// Marks a task permanently failed after it has exhausted `max_retries`, persisting the final
/// attempt count alongside the status change so `list_dlq`'s `retry_count >= max_retries` filter
/// actually picks it up.
pub async fn mark_failed_exhausted(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    retry_count: i32,
    completed_at: DateTime<Utc>,
    last_error: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.tasks
        SET status = 'failed', retry_count = $2, completed_at = $3, lease_deadline = NULL,
            last_error = $4, updated_at = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(retry_count)
    .bind(completed_at)
    .bind(last_error)
    .execute(&mut **tx)
    .await
    .context("mark task failed (retries exhausted)")?;
    Ok(())
}

/// Re-queue after a retryable failure: increments `retry_count`, clears the lease, and sets a
/// new effective `enqueued_at` reflecting the backoff delay.
pub async fn requeue_for_retry(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    new_retry_count: i32,
    effective_enqueued_at: DateTime<Utc>,
    last_error: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.tasks
        SET status = 'queued', retry_count = $2, enqueued_at = $3,
            lease_deadline = NULL, last_error = $4, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(new_retry_count)
    .bind(effective_enqueued_at)
    .bind(last_error)
    .execute(&mut **tx)
    .await
    .context("requeue task for retry")?;
    Ok(())
}

pub async fn extend_lease(
    pool: &PgPool,
    id: Uuid,
    new_deadline: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orc.tasks
        SET lease_deadline = $2, updated_at = now()
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(new_deadline)
    .execute(pool)
    .await
    .context("extend task lease")?;
    Ok(result.rows_affected() == 1)
}

fn row_to_task(row: sqlx::postgres::PgRow) -> anyhow::Result<Task> {
    let task_type: String = row.try_get("task_type")?;
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: row.try_get("id")?,
        task_type: task_type.parse::<TaskType>()?,
        payload: row.try_get("payload")?,
        priority: row.try_get("priority")?,
        status: status.parse::<TaskStatus>()?,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        idempotency_key: row.try_get("idempotency_key")?,
        trace_id: row.try_get("trace_id")?,
        enqueued_at: row.try_get("enqueued_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_error: row.try_get("last_error")?,
        lease_deadline: row.try_get("lease_deadline")?,
    })
}
