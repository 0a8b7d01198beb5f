//! Ledger error model.

use thiserror::Error;

use crate::amount::Amount;
use crate::id::AccountId;

/// Result type used across the ledger domain.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every variant describes a rejected operation. Handlers detect these before
/// any state is written, so a returned error always means "nothing changed".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The caller does not hold the role the operation requires.
    #[error("unauthorized: account {account} lacks role {role}")]
    Unauthorized { role: String, account: AccountId },

    /// A debit or move exceeds the available balance.
    #[error("insufficient balance for {account}: available {available}, required {required}")]
    InsufficientBalance {
        account: AccountId,
        available: Amount,
        required: Amount,
    },

    /// A credit would exceed the representable maximum.
    #[error("arithmetic overflow")]
    Overflow,

    /// Malformed input (mismatched batch lengths, unparsable amount, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The null account (or another disallowed account) was used as a target.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// `Initialize` was issued against a ledger that already exists.
    #[error("ledger already initialized")]
    AlreadyInitialized,

    /// An operation was issued before the ledger was initialized.
    #[error("ledger not initialized")]
    NotInitialized,

    /// The supply identity does not hold. Only surfaced by audits.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn unauthorized(role: impl Into<String>, account: AccountId) -> Self {
        Self::Unauthorized {
            role: role.into(),
            account,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Short, stable name of the error kind (useful as a log field).
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::Overflow => "overflow",
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::InvalidTarget(_) => "invalid_target",
            LedgerError::AlreadyInitialized => "already_initialized",
            LedgerError::NotInitialized => "not_initialized",
            LedgerError::InvariantViolation(_) => "invariant_violation",
        }
    }
}
