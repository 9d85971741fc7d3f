use anyhow::Context;
use chrono::{DateTime, Utc};
use orc_core::{CircuitState, CircuitStateKind};
use sqlx::{PgPool, Row};

/// Ensures a row exists for `service`, defaulting to closed — unknown services start
/// closed, not open).
pub async fn ensure_row(pool: &PgPool, service: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO orc.circuit_state (service) VALUES ($1) ON CONFLICT (service) DO NOTHING"#,
    )
    .bind(service)
    .execute(pool)
    .await
    .context("seed circuit state row")?;
    Ok(())
}

pub async fn get(pool: &PgPool, service: &str) -> anyhow::Result<CircuitState> {
    ensure_row(pool, service).await?;
    let row = sqlx::query(
        r#"
        SELECT service, state, failure_count, success_count, error_rate, last_failure_at,
               last_success_at, opened_at, next_retry_at
        FROM orc.circuit_state WHERE service = $1
        "#,
    )
    .bind(service)
    .fetch_one(pool)
    .await
    .context("fetch circuit state")?;
    row_to_state(row)
}

/// Row-locks `service`'s state for a transition, letting the caller decide the next state from
/// a consistent read of the circuit breaker state. Call sites hold this inside a transaction.
pub async fn lock(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    service: &str,
) -> anyhow::Result<CircuitState> {
    let row = sqlx::query(
        r#"
        SELECT service, state, failure_count, success_count, error_rate, last_failure_at,
               last_success_at, opened_at, next_retry_at
        FROM orc.circuit_state WHERE service = $1
        FOR UPDATE
        "#,
    )
    .bind(service)
    .fetch_one(&mut **tx)
    .await
    .context("lock circuit state")?;
    row_to_state(row)
}

/// Moves `service` to `new_state` without touching the success/failure counters — used for the
/// open→half_open transition, which is a timeout expiry, not an observed call outcome.
pub async fn transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    service: &str,
    new_state: CircuitStateKind,
) -> anyhow::Result<()> {
    sqlx::query(r#"UPDATE orc.circuit_state SET state = $2 WHERE service = $1"#)
        .bind(service)
        .bind(new_state.as_str())
        .execute(&mut **tx)
        .await
        .context("transition circuit state")?;
    Ok(())
}

pub async fn record_success(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    service: &str,
    now: DateTime<Utc>,
    new_state: CircuitStateKind,
    error_rate: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.circuit_state
        SET state = $2, success_count = success_count + 1, error_rate = $3,
            last_success_at = $4, opened_at = CASE WHEN $2 = 'closed' THEN NULL ELSE opened_at END,
            next_retry_at = CASE WHEN $2 = 'closed' THEN NULL ELSE next_retry_at END
        WHERE service = $1
        "#,
    )
    .bind(service)
    .bind(new_state.as_str())
    .bind(error_rate)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("record circuit success")?;
    Ok(())
}

pub async fn record_failure(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    service: &str,
    now: DateTime<Utc>,
    new_state: CircuitStateKind,
    error_rate: f64,
    opened_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.circuit_state
        SET state = $2, failure_count = failure_count + 1, error_rate = $3,
            last_failure_at = $4, opened_at = COALESCE($5, opened_at), next_retry_at = $6
        WHERE service = $1
        "#,
    )
    .bind(service)
    .bind(new_state.as_str())
    .bind(error_rate)
    .bind(now)
    .bind(opened_at)
    .bind(next_retry_at)
    .execute(&mut **tx)
    .await
    .context("record circuit failure")?;
    Ok(())
}

fn row_to_state(row: sqlx::postgres::PgRow) -> anyhow::Result<CircuitState> {
    let state: String = row.try_get("state")?;
    Ok(CircuitState {
        service: row.try_get("service")?,
        state: state.parse::<CircuitStateKind>()?,
        failure_count: row.try_get("failure_count")?,
        success_count: row.try_get("success_count")?,
        error_rate: row.try_get("error_rate")?,
        last_failure_at: row.try_get("last_failure_at")?,
        last_success_at: row.try_get("last_success_at")?,
        opened_at: row.try_get("opened_at")?,
        next_retry_at: row.try_get("next_retry_at")?,
    })
}
