//! Read models built from published ledger events.
//!
//! Projections are rebuildable from the event stream and idempotent under
//! at-least-once delivery.

pub mod balances;

pub use balances::{BalanceSheet, BalancesProjection, BalancesProjectionError};
