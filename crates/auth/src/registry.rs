//! Role registry: which accounts hold which roles.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use tally_core::AccountId;

use crate::{AuthzError, Role};

/// Role membership: which accounts hold which role.
///
/// Only explicit memberships are stored. `Admin` satisfying `Minter`/`Burner`
/// is computed at check time by [`RoleRegistry::has`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRegistry {
    members: HashMap<Role, BTreeSet<AccountId>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where `admin` holds every role.
    pub fn with_admin(admin: AccountId) -> Self {
        let mut registry = Self::new();
        for role in Role::ALL {
            registry.insert(role, admin);
        }
        registry
    }

    /// Capability check: explicit membership, or `Admin` for any role.
    pub fn has(&self, role: Role, account: AccountId) -> bool {
        self.roles_of(account).into_iter().any(|held| held.implies(role))
    }

    /// Raw membership check (no `Admin` expansion).
    pub fn holds(&self, role: Role, account: AccountId) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(&account))
            .unwrap_or(false)
    }

    /// `Ok(())` if `caller` satisfies `role`.
    pub fn require(&self, role: Role, caller: AccountId) -> Result<(), AuthzError> {
        if self.has(role, caller) {
            Ok(())
        } else {
            Err(AuthzError::MissingRole {
                role,
                account: caller,
            })
        }
    }

    /// Admin-gated grant. Returns whether membership changed (idempotent).
    pub fn grant(
        &mut self,
        caller: AccountId,
        role: Role,
        account: AccountId,
    ) -> Result<bool, AuthzError> {
        self.require(Role::Admin, caller)?;
        Ok(self.insert(role, account))
    }

    /// Admin-gated revoke. Returns whether membership changed (idempotent).
    ///
    /// Removing the last `Admin` is allowed here; callers that need lockout
    /// protection check [`RoleRegistry::admin_count`] first.
    pub fn revoke(
        &mut self,
        caller: AccountId,
        role: Role,
        account: AccountId,
    ) -> Result<bool, AuthzError> {
        self.require(Role::Admin, caller)?;
        Ok(self.remove(role, account))
    }

    /// Unchecked insert, for applying already-authorized changes.
    pub fn insert(&mut self, role: Role, account: AccountId) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    /// Unchecked removal, for applying already-authorized changes.
    pub fn remove(&mut self, role: Role, account: AccountId) -> bool {
        match self.members.get_mut(&role) {
            Some(set) => set.remove(&account),
            None => false,
        }
    }

    /// Explicit members of a role, in stable order.
    pub fn members(&self, role: Role) -> Vec<AccountId> {
        self.members
            .get(&role)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Roles explicitly held by `account`.
    pub fn roles_of(&self, account: AccountId) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.holds(*role, account))
            .collect()
    }

    pub fn admin_count(&self) -> usize {
        self.members.get(&Role::Admin).map(BTreeSet::len).unwrap_or(0)
    }
}
