//! `tally-core`: ledger foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod amount;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use amount::{Amount, DECIMALS, UNITS_PER_WHOLE};
pub use error::{LedgerError, LedgerResult};
pub use id::{AccountId, LedgerId};
pub use value_object::ValueObject;
