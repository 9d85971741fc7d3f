use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// `ExtendLease`/`Release` called with a token that no longer matches the held lock,
    /// either because it expired and was reissued or never existed.
    #[error("lease_lost")]
    LeaseLost,
}
