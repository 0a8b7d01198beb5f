//! Ledger configuration loaded from the environment.
//!
//! | Variable               | Meaning                               | Default                 |
//! |------------------------|---------------------------------------|-------------------------|
//! | `TALLY_NAME`           | token name                            | `Tally`                 |
//! | `TALLY_SYMBOL`         | token symbol                          | `TLY`                   |
//! | `TALLY_INITIAL_SUPPLY` | supply minted to the admin (whole)    | `1000000000`            |
//! | `TALLY_ADMIN`          | administrator account (UUID)          | freshly generated       |
//! | `TALLY_LEDGER_ID`      | ledger stream id (UUID)               | freshly generated       |

use anyhow::{Context, anyhow};

use tally_core::{AccountId, Amount, LedgerId};
use tally_token::DEFAULT_INITIAL_SUPPLY;

pub const ENV_NAME: &str = "TALLY_NAME";
pub const ENV_SYMBOL: &str = "TALLY_SYMBOL";
pub const ENV_INITIAL_SUPPLY: &str = "TALLY_INITIAL_SUPPLY";
pub const ENV_ADMIN: &str = "TALLY_ADMIN";
pub const ENV_LEDGER_ID: &str = "TALLY_LEDGER_ID";

pub const DEFAULT_NAME: &str = "Tally";
pub const DEFAULT_SYMBOL: &str = "TLY";

/// Everything needed to bootstrap a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub ledger_id: LedgerId,
    pub admin: AccountId,
    pub name: String,
    pub symbol: String,
    pub initial_supply: Amount,
}

impl LedgerConfig {
    /// Defaults with a fresh ledger id and administrator.
    pub fn new() -> Self {
        Self {
            ledger_id: LedgerId::new(),
            admin: AccountId::new(),
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            initial_supply: DEFAULT_INITIAL_SUPPLY,
        }
    }

    /// Load from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Unset or blank values fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::new();

        if let Some(name) = get(ENV_NAME) {
            config.name = name;
        }
        if let Some(symbol) = get(ENV_SYMBOL) {
            config.symbol = symbol;
        }
        if let Some(raw) = get(ENV_INITIAL_SUPPLY) {
            let whole: u128 = raw
                .parse()
                .with_context(|| format!("{ENV_INITIAL_SUPPLY} must be a whole number, got {raw:?}"))?;
            config.initial_supply = Amount::from_whole(whole)
                .ok_or_else(|| anyhow!("{ENV_INITIAL_SUPPLY} is too large: {whole}"))?;
        }
        if let Some(raw) = get(ENV_ADMIN) {
            config.admin = raw
                .parse()
                .with_context(|| format!("{ENV_ADMIN} is not a valid account id"))?;
        }
        if let Some(raw) = get(ENV_LEDGER_ID) {
            config.ledger_id = raw
                .parse()
                .with_context(|| format!("{ENV_LEDGER_ID} is not a valid ledger id"))?;
        }

        if config.admin.is_null() {
            return Err(anyhow!("{ENV_ADMIN} cannot be the null account"));
        }

        Ok(config)
    }

    /// Initial supply in whole units (rounded down).
    pub fn initial_supply_whole(&self) -> u128 {
        self.initial_supply.units() / tally_core::UNITS_PER_WHOLE
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new()
    }
}
