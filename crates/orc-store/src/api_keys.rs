use anyhow::Context;
use orc_core::{ApiKey, ApiKeyRole};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub async fn create(
    pool: &PgPool,
    key_hash: &str,
    name: &str,
    role: ApiKeyRole,
) -> anyhow::Result<ApiKey> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO orc.api_keys (id, key_hash, name, role)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(key_hash)
    .bind(name)
    .bind(role.as_str())
    .execute(pool)
    .await
    .context("insert api key")?;

    get(pool, id)
        .await?
        .context("api key vanished immediately after insert")
}

pub async fn get(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<ApiKey>> {
    let row = sqlx::query(
        r#"
        SELECT id, key_hash, name, role, expires_at, is_active, last_used_at
        FROM orc.api_keys WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch api key")?;
    row.map(row_to_key).transpose()
}

/// Looks up an active, unexpired key by its hash. The caller is responsible for constant-time
/// comparison upstream of hashing — this matches on the hash alone.
pub async fn find_active_by_hash(pool: &PgPool, key_hash: &str) -> anyhow::Result<Option<ApiKey>> {
    let row = sqlx::query(
        r#"
        SELECT id, key_hash, name, role, expires_at, is_active, last_used_at
        FROM orc.api_keys
        WHERE key_hash = $1 AND is_active
          AND (expires_at IS NULL OR expires_at > now())
        "#,
    )
    .bind(key_hash)
    .fetch_optional(pool)
    .await
    .context("fetch api key by hash")?;
    row.map(row_to_key).transpose()
}

/// Fire-and-forget bump of `last_used_at`; callers should not block the request path on this.
pub async fn touch_last_used(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(r#"UPDATE orc.api_keys SET last_used_at = now() WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await
        .context("touch api key last_used_at")?;
    Ok(())
}

pub async fn revoke(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(r#"UPDATE orc.api_keys SET is_active = false WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await
        .context("revoke api key")?;
    Ok(())
}

fn row_to_key(row: sqlx::postgres::PgRow) -> anyhow::Result<ApiKey> {
    let role: String = row.try_get("role")?;
    Ok(ApiKey {
        id: row.try_get("id")?,
        key_hash: row.try_get("key_hash")?,
        name: row.try_get("name")?,
        role: role.parse::<ApiKeyRole>()?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        last_used_at: row.try_get("last_used_at")?,
    })
}
