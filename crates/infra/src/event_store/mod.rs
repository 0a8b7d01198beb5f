//! Append-only event store boundary.
//!
//! Streams are keyed by `LedgerId`; each ledger instance owns exactly one
//! stream. Nothing here assumes a particular storage backend.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
