use crate::config::RelayConfig;
use crate::sink::{Sink, SinkError};
use chrono::Utc;
use orc_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Drives the outbox drain and delivered-row purge loops. One `Relay` instance is enough for a
/// process; multiple relay processes may run against the same Durable Store since batch claims
/// use `FOR UPDATE SKIP LOCKED`.
pub struct Relay {
    store: Store,
    sinks: HashMap<String, Arc<dyn Sink>>,
    default_sink: Arc<dyn Sink>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(store: Store, default_sink: Arc<dyn Sink>, config: RelayConfig) -> Self {
        Self {
            store,
            sinks: HashMap::new(),
            default_sink,
            config,
        }
    }

    pub fn register_sink(&mut self, effect_type: impl Into<String>, sink: Arc<dyn Sink>) {
        self.sinks.insert(effect_type.into(), sink);
    }

    fn sink_for(&self, effect_type: &str) -> &Arc<dyn Sink> {
        self.sinks.get(effect_type).unwrap_or(&self.default_sink)
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let drain_interval = Duration::from_millis(self.config.poll_interval_ms);
        let purge_interval = Duration::from_millis(self.config.purge_interval_ms);
        let mut last_purge = tokio::time::Instant::now();

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            if let Err(err) = self.drain_once().await {
                tracing::warn!(error = %err, "outbox drain error");
            }

            if last_purge.elapsed() >= purge_interval {
                if let Err(err) = self.purge_once().await {
                    tracing::warn!(error = %err, "outbox purge error");
                }
                last_purge = tokio::time::Instant::now();
            }

            tokio::select! {
                _ = tokio::time::sleep(drain_interval) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    async fn drain_once(&self) -> anyhow::Result<()> {
        let mut tx = self.store.pool().begin().await?;
        let batch = orc_store::outbox::claim_batch(&mut tx, self.config.batch_size).await?;

        for entry in &batch {
            match self.sink_for(&entry.effect_type).deliver(entry).await {
                Ok(()) => {
                    orc_store::outbox::mark_delivered(&mut tx, entry.id, Utc::now()).await?;
                }
                Err(SinkError::Terminal(err)) => {
                    tracing::warn!(outbox_id = %entry.id, error = %err, "outbox delivery terminal failure");
                    orc_store::outbox::mark_attempt_failed(&mut tx, entry.id, &err.to_string(), true)
                        .await?;
                }
                Err(SinkError::Retryable(err)) => {
                    let terminal = entry.retry_count + 1 >= entry.max_retries;
                    if terminal {
                        tracing::warn!(outbox_id = %entry.id, "outbox entry exhausted retries");
                    }
                    orc_store::outbox::mark_attempt_failed(
                        &mut tx,
                        entry.id,
                        &err.to_string(),
                        terminal,
                    )
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn purge_once(&self) -> anyhow::Result<()> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.purge_after_days);
        let purged = orc_store::outbox::purge_delivered(self.store.pool(), cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, "purged delivered outbox entries");
        }
        Ok(())
    }
}
