use anyhow::Context;
use orc_core::{InboxEntry, InboxStatus};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

pub enum RecordOutcome {
    /// First time this `(source, external_id)` pair has been seen.
    New(InboxEntry),
    /// Already recorded; the gateway should return its prior disposition instead of reprocessing.
    Duplicate(InboxEntry),
}

/// Records an inbound webhook, relying on the `(source, external_id)` unique index to catch
/// replays of a previously-accepted webhook delivery.
///
/// Takes a transaction so the gateway handler can create the linked task and mark this entry
/// processed in the same transaction — a crash between the two can then never leave the entry
/// stuck at `received` with no task to show for it.
pub async fn record(
    tx: &mut Transaction<'_, Postgres>,
    source: &str,
    external_id: &str,
    signature_hash: &str,
    payload: &Value,
) -> anyhow::Result<RecordOutcome> {
    let id = Uuid::new_v4();
    let inserted = sqlx::query(
        r#"
        INSERT INTO orc.inbox (id, source, external_id, signature_hash, payload)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source, external_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(source)
    .bind(external_id)
    .bind(signature_hash)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .context("insert inbox entry")?;

    if inserted.rows_affected() == 1 {
        let entry = get_tx(tx, id)
            .await?
            .context("inbox entry vanished immediately after insert")?;
        return Ok(RecordOutcome::New(entry));
    }

    let existing = get_by_source_and_external_id_tx(tx, source, external_id)
        .await?
        .context("inbox conflict but no row found")?;
    Ok(RecordOutcome::Duplicate(existing))
}

pub async fn get(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<InboxEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, source, external_id, signature_hash, received_at, processed_at, payload,
               task_id, status, rejection_reason
        FROM orc.inbox WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch inbox entry")?;
    row.map(row_to_entry).transpose()
}

pub async fn get_by_source_and_external_id(
    pool: &PgPool,
    source: &str,
    external_id: &str,
) -> anyhow::Result<Option<InboxEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, source, external_id, signature_hash, received_at, processed_at, payload,
               task_id, status, rejection_reason
        FROM orc.inbox WHERE source = $1 AND external_id = $2
        "#,
    )
    .bind(source)
    .bind(external_id)
    .fetch_optional(pool)
    .await
    .context("fetch inbox entry by source/external_id")?;
    row.map(row_to_entry).transpose()
}

async fn get_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> anyhow::Result<Option<InboxEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, source, external_id, signature_hash, received_at, processed_at, payload,
               task_id, status, rejection_reason
        FROM orc.inbox WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("fetch inbox entry")?;
    row.map(row_to_entry).transpose()
}

async fn get_by_source_and_external_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    source: &str,
    external_id: &str,
) -> anyhow::Result<Option<InboxEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, source, external_id, signature_hash, received_at, processed_at, payload,
               task_id, status, rejection_reason
        FROM orc.inbox WHERE source = $1 AND external_id = $2
        "#,
    )
    .bind(source)
    .bind(external_id)
    .fetch_optional(&mut **tx)
    .await
    .context("fetch inbox entry by source/external_id")?;
    row.map(row_to_entry).transpose()
}

pub async fn mark_processed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    task_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.inbox
        SET status = 'processed', processed_at = now(), task_id = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(task_id)
    .execute(&mut **tx)
    .await
    .context("mark inbox entry processed")?;
    Ok(())
}

pub async fn mark_rejected(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    reason: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orc.inbox
        SET status = 'rejected', processed_at = now(), rejection_reason = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(reason)
    .execute(&mut **tx)
    .await
    .context("mark inbox entry rejected")?;
    Ok(())
}

fn row_to_entry(row: sqlx::postgres::PgRow) -> anyhow::Result<InboxEntry> {
    let status: String = row.try_get("status")?;
    Ok(InboxEntry {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        signature_hash: row.try_get("signature_hash")?,
        received_at: row.try_get("received_at")?,
        processed_at: row.try_get("processed_at")?,
        payload: row.try_get("payload")?,
        task_id: row.try_get("task_id")?,
        status: match status.as_str() {
            "received" => InboxStatus::Received,
            "processing" => InboxStatus::Processing,
            "processed" => InboxStatus::Processed,
            _ => InboxStatus::Rejected,
        },
        rejection_reason: row.try_get("rejection_reason")?,
    })
}
