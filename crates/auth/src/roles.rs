//! Roles and the implication rule (ADMIN satisfies every role check).

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use tally_core::LedgerError;

/// Role identifier used for ledger authorization.
///
/// The set is closed. `Admin` is distinguished: it administers the other
/// roles and implicitly satisfies `Minter` and `Burner` checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Minter,
    Burner,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Minter, Role::Burner];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Minter => "MINTER",
            Role::Burner => "BURNER",
        }
    }

    /// Whether holding `self` satisfies a check for `required`.
    pub fn implies(self, required: Role) -> bool {
        self == required || self == Role::Admin
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MINTER" => Ok(Role::Minter),
            "BURNER" => Ok(Role::Burner),
            other => Err(LedgerError::invalid_input(format!("unknown role '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_implies_every_role() {
        for role in Role::ALL {
            assert!(Role::Admin.implies(role));
        }
        assert!(!Role::Minter.implies(Role::Burner));
        assert!(!Role::Burner.implies(Role::Admin));
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("minter".parse::<Role>().unwrap(), Role::Minter);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Burner).unwrap(), "\"BURNER\"");
    }
}
