use anyhow::Context;
use chrono::NaiveDate;
use orc_core::BudgetLedger;
use sqlx::{PgPool, Row};

/// Result of a reservation attempt against a provider's daily budget.
pub enum ReserveOutcome {
    /// Reservation succeeded; ledger now reflects the added spend.
    Committed(BudgetLedger),
    /// Reservation would push `spent_usd` past `budget_usd * (1 + overcommit_tolerance)`.
    Exceeded(BudgetLedger),
}

/// Ensures a ledger row exists for `(provider, date)`, seeding it from `default_budget_usd` if
/// this is the first spend of the day. The ledger rolls over at UTC midnight.
async fn ensure_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    provider: &str,
    date: NaiveDate,
    default_budget_usd: f64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orc.budget_ledger (provider, date, budget_usd)
        VALUES ($1, $2, $3)
        ON CONFLICT (provider, date) DO NOTHING
        "#,
    )
    .bind(provider)
    .bind(date)
    .bind(default_budget_usd)
    .execute(&mut **tx)
    .await
    .context("seed budget ledger row")?;
    Ok(())
}

/// Locks the ledger row, checks the ceiling, and (if affordable) debits it, all inside one
/// transaction — the `FOR UPDATE` lock is held across the check-then-act window so concurrent
/// spenders never both read the same pre-update `spent_usd` and both pass the ceiling check.
///
/// `overcommit_tolerance` is the fraction over `budget_usd` still allowed through (default
/// 0.10 — the dispatcher keeps running attempts already in flight rather than aborting them).
pub async fn reserve(
    pool: &PgPool,
    provider: &str,
    date: NaiveDate,
    default_budget_usd: f64,
    cost_usd: f64,
    tokens: i64,
    overcommit_tolerance: f64,
) -> anyhow::Result<ReserveOutcome> {
    let mut tx = pool.begin().await.context("begin budget reservation")?;

    ensure_row(&mut tx, provider, date, default_budget_usd).await?;

    let row = sqlx::query(
        r#"
        SELECT provider, date, budget_usd, spent_usd, tokens, requests, last_updated
        FROM orc.budget_ledger
        WHERE provider = $1 AND date = $2
        FOR UPDATE
        "#,
    )
    .bind(provider)
    .bind(date)
    .fetch_one(&mut *tx)
    .await
    .context("lock budget ledger row")?;

    let current_spent: f64 = row.try_get("spent_usd")?;
    let budget_usd: f64 = row.try_get("budget_usd")?;
    let ceiling = budget_usd * (1.0 + overcommit_tolerance);

    if current_spent + cost_usd > ceiling {
        let ledger = row_to_ledger(row)?;
        tx.commit().await.context("commit budget reservation (exceeded)")?;
        return Ok(ReserveOutcome::Exceeded(ledger));
    }

    let row = sqlx::query(
        r#"
        UPDATE orc.budget_ledger
        SET spent_usd = spent_usd + $3, tokens = tokens + $4, requests = requests + 1,
            last_updated = now()
        WHERE provider = $1 AND date = $2
        RETURNING provider, date, budget_usd, spent_usd, tokens, requests, last_updated
        "#,
    )
    .bind(provider)
    .bind(date)
    .bind(cost_usd)
    .bind(tokens)
    .fetch_one(&mut *tx)
    .await
    .context("commit budget spend")?;

    let ledger = row_to_ledger(row)?;
    tx.commit().await.context("commit budget reservation")?;
    Ok(ReserveOutcome::Committed(ledger))
}

pub async fn get(pool: &PgPool, provider: &str, date: NaiveDate) -> anyhow::Result<Option<BudgetLedger>> {
    let row = sqlx::query(
        r#"
        SELECT provider, date, budget_usd, spent_usd, tokens, requests, last_updated
        FROM orc.budget_ledger WHERE provider = $1 AND date = $2
        "#,
    )
    .bind(provider)
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("fetch budget ledger")?;
    row.map(row_to_ledger).transpose()
}

fn row_to_ledger(row: sqlx::postgres::PgRow) -> anyhow::Result<BudgetLedger> {
    Ok(BudgetLedger {
        provider: row.try_get("provider")?,
        date: row.try_get("date")?,
        budget_usd: row.try_get("budget_usd")?,
        spent_usd: row.try_get("spent_usd")?,
        tokens: row.try_get("tokens")?,
        requests: row.try_get("requests")?,
        last_updated: row.try_get("last_updated")?,
    })
}
