//! Outbox Relay: drains pending external side-effects with retry and at-least-once delivery to
//! idempotent sinks. Grounded on `drain_outbox_once`/`outbox_drain_loop` in the
//! teacher's dispatcher (`FOR UPDATE SKIP LOCKED` batch drain) and the delivery-with-backoff and
//! purge-after-N-days idiom from the webhook-outbox dispatcher reference file.

mod config;
mod relay;
mod sink;

pub use config::RelayConfig;
pub use relay::Relay;
pub use sink::{LoggingSink, Sink, SinkError};
