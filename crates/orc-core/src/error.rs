use thiserror::Error;

/// Errors raised by shared core logic (parsing, validation, invariants) that do not belong
/// to any single component's taxonomy.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown task type `{0}`")]
    UnknownTaskType(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Client-facing terminal errors. These map 1:1 to stable HTTP status codes at
/// the gateway boundary and never trigger a retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid_request")]
    InvalidRequest(String),

    #[error("invalid_signature")]
    InvalidSignature,

    #[error("replay_blocked")]
    ReplayBlocked,

    #[error("replay_window_exceeded")]
    ReplayWindowExceeded,

    #[error("budget_exceeded")]
    BudgetExceeded,

    #[error("queue_full")]
    QueueFull,

    #[error("circuit_open")]
    CircuitOpen,

    #[error("invalid_body")]
    InvalidBody(String),
}

impl ClientError {
    /// Stable machine-readable code, used both in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::InvalidRequest(_) => "invalid_request",
            ClientError::InvalidSignature => "invalid_signature",
            ClientError::ReplayBlocked => "replay_blocked",
            ClientError::ReplayWindowExceeded => "replay_window_exceeded",
            ClientError::BudgetExceeded => "budget_exceeded",
            ClientError::QueueFull => "queue_full",
            ClientError::CircuitOpen => "circuit_open",
            ClientError::InvalidBody(_) => "invalid_body",
        }
    }
}

/// Errors a task handler (or the dispatcher's interpretation of a handler's outcome) can raise.
///
/// `Retryable` consumes one unit of `retry_count`; `Terminal` finalizes the task as `failed`
/// with no further retries.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("retryable handler error: {0}")]
    Retryable(String),

    #[error("terminal handler error: {0}")]
    Terminal(String),
}

/// Infrastructure failures (Durable Store or Queue Broker unreachable). These never finalize
/// a task — the caller backs off and retries the *dispatch loop*, not the task itself.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("queue broker unavailable: {0}")]
    QueueUnavailable(#[source] anyhow::Error),
}
