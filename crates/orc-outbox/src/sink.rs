use async_trait::async_trait;
use orc_core::OutboxEntry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("retryable delivery error: {0}")]
    Retryable(#[source] anyhow::Error),

    #[error("terminal delivery error: {0}")]
    Terminal(#[source] anyhow::Error),
}

/// Delivery target for outbox entries, keyed by outbox id so a redelivered entry is a no-op at
/// the sink; sinks are expected to be idempotent. Handler-specific dispatch (webhook POST, downstream
/// API call, notification) lives behind this trait.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), SinkError>;
}

/// A sink that just logs. Used in tests and as the default wiring for effect types with no
/// registered real sink, following the common pattern of a trait-object seam with a trivial
/// default implementation for local development.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl Sink for LoggingSink {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), SinkError> {
        tracing::info!(
            outbox_id = %entry.id,
            task_id = %entry.task_id,
            effect_type = %entry.effect_type,
            target = %entry.target,
            "delivered outbox entry"
        );
        Ok(())
    }
}
