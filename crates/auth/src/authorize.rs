//! Authorization failures and audit explanations of role checks.

use serde::Serialize;
use thiserror::Error;

use tally_core::{AccountId, LedgerError};

use crate::{Role, RoleRegistry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: account {account} lacks role {role}")]
    MissingRole { role: Role, account: AccountId },
}

impl From<AuthzError> for LedgerError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::MissingRole { role, account } => {
                LedgerError::unauthorized(role.as_str(), account)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// How an authorization decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The account explicitly holds the required role.
    Direct,
    /// The account holds `ADMIN`, which satisfies the required role.
    ImpliedByAdmin,
    /// The account holds nothing that satisfies the required role.
    Denied,
}

/// Detailed explanation of an authorization decision.
///
/// Answers "why was this operation allowed/denied?" for operator tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationExplanation {
    pub required_role: Role,
    pub account: AccountId,
    pub granted: bool,
    pub decision: Decision,
    /// Roles explicitly held by the account.
    pub held_roles: Vec<Role>,
    pub reason: String,
    /// Remediation hints when denied.
    pub suggestions: Vec<String>,
}

/// Explain an authorization decision against `registry`.
pub fn explain_authorization(
    registry: &RoleRegistry,
    required: Role,
    account: AccountId,
) -> AuthorizationExplanation {
    let held_roles = registry.roles_of(account);

    let decision = if registry.holds(required, account) {
        Decision::Direct
    } else if registry.holds(Role::Admin, account) {
        Decision::ImpliedByAdmin
    } else {
        Decision::Denied
    };

    let (reason, suggestions) = match decision {
        Decision::Direct => (format!("account holds role {required}"), vec![]),
        Decision::ImpliedByAdmin => (
            format!("account holds ADMIN, which satisfies {required}"),
            vec![],
        ),
        Decision::Denied => {
            let mut suggestions = vec![format!("ask an ADMIN to grant {required} to {account}")];
            if required != Role::Admin {
                suggestions.push("ADMIN holders satisfy this check implicitly".to_string());
            }
            if held_roles.is_empty() {
                (format!("account holds no roles; {required} required"), suggestions)
            } else {
                let held: Vec<&str> = held_roles.iter().map(Role::as_str).collect();
                (
                    format!("account holds {held:?}; none satisfies {required}"),
                    suggestions,
                )
            }
        }
    };

    AuthorizationExplanation {
        required_role: required,
        account,
        granted: decision != Decision::Denied,
        decision,
        held_roles,
        reason,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_role_maps_to_ledger_unauthorized() {
        let account = AccountId::new();
        let err: LedgerError = AuthzError::MissingRole {
            role: Role::Minter,
            account,
        }
        .into();
        assert_eq!(err, LedgerError::unauthorized("MINTER", account));
    }

    #[test]
    fn explains_direct_implied_and_denied() {
        let admin = AccountId::new();
        let minter = AccountId::new();
        let nobody = AccountId::new();
        let mut registry = RoleRegistry::with_admin(admin);
        registry.insert(Role::Minter, minter);
        registry.remove(Role::Burner, admin);

        let direct = explain_authorization(&registry, Role::Minter, minter);
        assert_eq!(direct.decision, Decision::Direct);
        assert!(direct.granted);

        let implied = explain_authorization(&registry, Role::Burner, admin);
        assert_eq!(implied.decision, Decision::ImpliedByAdmin);
        assert!(implied.granted);

        let denied = explain_authorization(&registry, Role::Burner, minter);
        assert_eq!(denied.decision, Decision::Denied);
        assert!(!denied.granted);
        assert_eq!(denied.held_roles, vec![Role::Minter]);
        assert!(!denied.suggestions.is_empty());

        let empty = explain_authorization(&registry, Role::Admin, nobody);
        assert!(empty.reason.contains("no roles"));
        assert_eq!(empty.suggestions.len(), 1);
    }

    #[test]
    fn explanation_agrees_with_has() {
        let admin = AccountId::new();
        let registry = RoleRegistry::with_admin(admin);
        let stranger = AccountId::new();
        for role in Role::ALL {
            for account in [admin, stranger] {
                assert_eq!(
                    explain_authorization(&registry, role, account).granted,
                    registry.has(role, account)
                );
            }
        }
    }
}
