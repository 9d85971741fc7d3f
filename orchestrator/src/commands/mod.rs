pub mod dlq;
pub mod migrate;
pub mod outbox_relay;
pub mod serve;
pub mod worker;
