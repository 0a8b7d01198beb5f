//! Token ledger (role-gated fungible asset, event-sourced).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod mint;
pub mod supply;
pub mod token;
pub mod transfer;

pub use supply::{Credit, SupplyLedger};
pub use token::{
    AGGREGATE_TYPE, BatchMint, BatchMintRecord, Burn, BurnFrom, BurnRecord, DEFAULT_INITIAL_SUPPLY,
    GrantRole, INITIAL_SUPPLY_WHOLE, Initialize, Initialized, Mint, MintRecord, RenounceRole,
    RevokeRole, RoleChanged, Token, TokenCommand, TokenEvent, TokenMetadata, Transfer, Transferred,
};
