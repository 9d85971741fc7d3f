//! Durable Store: transactional Postgres-backed persistence for tasks, runs, the outbox/inbox,
//! budget ledgers, circuit state, and API keys.
//!
//! Every mutation to a task's status is paired with a run insert/update in the same
//! transaction, and every entity in the data model owns its row here — the in-memory Queue
//! Broker only ever holds transient indices over this state.

pub mod api_keys;
pub mod budget;
pub mod circuit;
pub mod inbox;
pub mod outbox;
pub mod runs;
pub mod tasks;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Handle to the Durable Store. Cheap to clone (wraps a `PgPool`).
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("connect to durable store at {database_url}"))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run durable store migrations")?;
        Ok(())
    }

    /// Used by `GET /health`: a cheap round trip that proves the pool can reach Postgres.
    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
