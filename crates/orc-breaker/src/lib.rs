//! Circuit Breaker Registry: per-dependency rolling error rate, state transitions, and probe
//! policy. State transitions are persisted to the Durable Store so they survive a
//! process restart; the rolling window of recent call outcomes is kept in-process, grounded on
//! the `AtomicU8`-state breaker in the reference SIEM pipeline's `circuit_breaker.rs` and adapted
//! to a Postgres-backed, multi-process-safe registry, serialized per service.

mod config;
mod registry;
mod window;

pub use config::BreakerConfig;
pub use registry::{Admission, Registry};
