//! `tally-auth`: role registry and authorization checks for the ledger.
//!
//! Pure policy: no IO, no storage. Identity resolution (who the caller is)
//! happens before anything here is consulted.

pub mod authorize;
pub mod registry;
pub mod roles;

pub use authorize::{AuthorizationExplanation, AuthzError, Decision, explain_authorization};
pub use registry::RoleRegistry;
pub use roles::Role;
