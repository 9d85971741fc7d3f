use anyhow::Context;
use chrono::{DateTime, Utc};
use orc_core::{Run, RunMetrics, RunStatus};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

/// Records the start of an attempt. `attempt` is `task.retry_count + 1` so it matches the
/// 1-indexed attempt numbers surfaced in `TaskView`.
pub async fn start(
    tx: &mut Transaction<'_, Postgres>,
    task_id: Uuid,
    attempt: i32,
    started_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO orc.runs (id, task_id, attempt, started_at, status)
        VALUES ($1, $2, $3, $4, 'started')
        "#,
    )
    .bind(id)
    .bind(task_id)
    .bind(attempt)
    .bind(started_at)
    .execute(&mut **tx)
    .await
    .context("insert run")?;
    Ok(id)
}

pub async fn finish(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    ended_at: DateTime<Utc>,
    status: RunStatus,
    metrics: &RunMetrics,
    error_details: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.runs
        SET ended_at = $2, status = $3, model_used = $4, tokens = $5, cost_usd = $6,
            error_details = $7
        WHERE id = $1
        "#,
    )
    .bind(run_id)
    .bind(ended_at)
    .bind(status.as_str())
    .bind(&metrics.model_used)
    .bind(metrics.tokens)
    .bind(metrics.cost_usd)
    .bind(error_details)
    .execute(&mut **tx)
    .await
    .context("finish run")?;
    Ok(())
}

/// Locks the most recent still-`started` run for `task_id`, if any. Used to finalize the run
/// left behind by a worker that crashed or stalled mid-attempt, so a reclaimed task never leaves
/// a stale `started` row behind it.
pub async fn lock_started_for_task(
    tx: &mut Transaction<'_, Postgres>,
    task_id: Uuid,
) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query(
        r#"
        SELECT id FROM orc.runs
        WHERE task_id = $1 AND status = 'started'
        ORDER BY attempt DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(task_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock started run for task")?;
    row.map(|r| r.try_get::<Uuid, _>("id")).transpose().context("read run id")
}

pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> anyhow::Result<Vec<Run>> {
    let rows = sqlx::query(
        r#"
        SELECT id, task_id, attempt, started_at, ended_at, status, model_used, tokens,
               cost_usd, error_details
        FROM orc.runs WHERE task_id = $1 ORDER BY attempt ASC
        "#,
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("list runs for task")?;

    rows.into_iter().map(row_to_run).collect()
}

fn row_to_run(row: sqlx::postgres::PgRow) -> anyhow::Result<Run> {
    let status: String = row.try_get("status")?;
    Ok(Run {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        attempt: row.try_get("attempt")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        status: status.parse::<RunStatus>().unwrap_or(RunStatus::Failed),
        metrics: RunMetrics {
            model_used: row.try_get("model_used")?,
            tokens: row.try_get("tokens")?,
            cost_usd: row.try_get("cost_usd")?,
        },
        error_details: row.try_get("error_details")?,
    })
}
