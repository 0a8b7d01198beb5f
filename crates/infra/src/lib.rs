//! Infrastructure layer: event store, command pipeline, read models, config.

pub mod config;
pub mod event_store;
pub mod projections;
pub mod token_service;


pub use config::LedgerConfig;
pub use token_service::{ServiceError, TokenService};
