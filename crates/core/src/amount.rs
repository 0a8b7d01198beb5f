//! Fixed-point asset amounts.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::value_object::ValueObject;

/// Number of fractional digits of the asset.
pub const DECIMALS: u8 = 8;

/// Smallest units per whole unit (`10^DECIMALS`).
pub const UNITS_PER_WHOLE: u128 = 100_000_000;

/// A non-negative quantity of the asset, in its smallest indivisible unit.
///
/// Serialized as a decimal string of units so the full 128-bit range survives
/// JSON round trips. `Display`/`FromStr` use the human form (`"12.5"`,
/// rendered as `"12.50000000"`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount(u128);

impl ValueObject for Amount {}

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const ONE: Amount = Amount(UNITS_PER_WHOLE);
    pub const MAX: Amount = Amount(u128::MAX);

    pub const fn from_units(units: u128) -> Self {
        Self(units)
    }

    /// `whole * 10^8`, or `None` if that does not fit.
    pub fn from_whole(whole: u128) -> Option<Self> {
        whole.checked_mul(UNITS_PER_WHOLE).map(Self)
    }

    pub const fn units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn saturating_add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_sub(rhs.0))
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let whole = self.0 / UNITS_PER_WHOLE;
        let frac = self.0 % UNITS_PER_WHOLE;
        write!(f, "{whole}.{frac:0width$}", width = DECIMALS as usize)
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Parse a human amount such as `"1000"`, `"0.5"` or `"12.00000001"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('-') {
            return Err(LedgerError::invalid_input("amount cannot be negative"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(LedgerError::invalid_input("amount is empty"));
        }
        if frac.len() > DECIMALS as usize {
            return Err(LedgerError::invalid_input(format!(
                "amount has more than {DECIMALS} fractional digits"
            )));
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::invalid_input(format!("malformed amount '{s}'")));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| LedgerError::Overflow)?
        };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = DECIMALS as usize);
            padded
                .parse()
                .map_err(|_| LedgerError::invalid_input(format!("malformed amount '{s}'")))?
        };

        Amount::from_whole(whole)
            .and_then(|a| a.checked_add(Amount(frac_units)))
            .ok_or(LedgerError::Overflow)
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.0.to_string()
    }
}

impl TryFrom<String> for Amount {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse::<u128>()
            .map(Amount)
            .map_err(|e| LedgerError::invalid_input(format!("amount units '{value}': {e}")))
    }
}
