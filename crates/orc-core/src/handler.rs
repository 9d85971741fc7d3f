use crate::model::TaskView;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A side effect a handler wants written to the outbox atomically with its run's finalize
/// Written as Outbox rows inside the run-finalizing transaction.
#[derive(Debug, Clone)]
pub struct OutboxEffect {
    pub effect_type: String,
    pub target: String,
    pub payload: Value,
}

/// Cancellation + tracing context threaded through a handler invocation.
///
/// `cancel` fires when the lease-extension heartbeat fails or the dispatcher is shutting down;
/// handlers are expected to select on it for every suspension point.
#[derive(Clone)]
pub struct HandlerContext {
    pub trace_id: Uuid,
    pub cancel: CancellationToken,
}

impl HandlerContext {
    pub fn new(trace_id: Uuid, cancel: CancellationToken) -> Self {
        Self { trace_id, cancel }
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The three outcomes the dispatcher interprets. A handler never decides
/// retry counts or backoff itself — it only classifies what happened.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Success {
        cost_usd: Option<f64>,
        tokens: Option<i64>,
        model_used: Option<String>,
        /// Dependency services this attempt touched, for circuit-breaker bookkeeping.
        dependencies_touched: Vec<String>,
        /// Side effects to write to the outbox in the same transaction as the finalize.
        outbox_effects: Vec<OutboxEffect>,
    },
    Retryable {
        error: String,
        dependencies_touched: Vec<String>,
    },
    Terminal {
        error: String,
    },
}

/// The seam handler bodies plug into. Generating content, opening pull requests, running
/// deploys — everything out of scope for this crate — lives behind this trait. The core only
/// invokes `handle` and interprets the returned [`HandlerOutcome`].
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &TaskView, ctx: HandlerContext) -> HandlerOutcome;
}
