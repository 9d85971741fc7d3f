//! Queue Broker: the in-process priority queue, TTL lock table, and atomic counters behind
//! `LeaseNext`/`ExtendLease`/`Release`. Holds no durable state of its own — a
//! process restart drops it entirely, which is fine because the Durable Store is authoritative
//! and the dispatcher's lease reaper rebuilds admission from there — the broker is in-memory
//! holds only transient indices").

mod broker;
mod error;
mod heap;

pub use broker::{Broker, BrokerConfig, Lease};
pub use error::QueueError;
pub use heap::QueueItem;
