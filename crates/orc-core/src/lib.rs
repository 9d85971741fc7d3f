//! Shared domain types and cross-crate contracts for the task orchestration core.
//!
//! This crate defines the entities described in the data model (`Task`, `Run`,
//! `OutboxEntry`, `InboxEntry`, `BudgetLedger`, `CircuitState`, `ApiKey`), the
//! error taxonomy every other crate maps into, and the seam where an external
//! collaborator plugs in: the typed task handler.

pub mod error;
pub mod handler;
pub mod model;

pub use error::{ClientError, CoreError, HandlerError};
pub use handler::{HandlerContext, HandlerOutcome, OutboxEffect, TaskHandler};
pub use model::*;
