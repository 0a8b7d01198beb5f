//! Supply ledger: balances plus the total-issued counter.
//!
//! Every mutating operation validates first and writes second, so an `Err`
//! always means nothing changed. `credit`/`debit` are the only operations that
//! change the total; `move_balance` is supply-neutral.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use tally_core::{AccountId, Amount, LedgerError, LedgerResult};

/// One leg of a batch credit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub account: AccountId,
    pub amount: Amount,
}

/// Balances by account plus `total_issued`.
///
/// Invariant: `total_issued == Σ balance_of(a)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyLedger {
    balances: HashMap<AccountId, Amount>,
    total_issued: Amount,
}

impl SupplyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance; zero for accounts never referenced.
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.balances.get(&account).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total_issued(&self) -> Amount {
        self.total_issued
    }

    /// Validate a credit; returns `(new_balance, new_total)`.
    pub fn check_credit(&self, account: AccountId, amount: Amount) -> LedgerResult<(Amount, Amount)> {
        ensure_not_null(account, "credit")?;
        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let total = self
            .total_issued
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok((balance, total))
    }

    /// Add `amount` to `account` and to the total. Returns the new balance.
    pub fn credit(&mut self, account: AccountId, amount: Amount) -> LedgerResult<Amount> {
        let (balance, total) = self.check_credit(account, amount)?;
        self.balances.insert(account, balance);
        self.total_issued = total;
        Ok(balance)
    }

    /// Validate a debit; returns `(new_balance, new_total)`.
    pub fn check_debit(&self, account: AccountId, amount: Amount) -> LedgerResult<(Amount, Amount)> {
        ensure_not_null(account, "debit")?;
        let available = self.balance_of(account);
        let balance = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account,
                available,
                required: amount,
            })?;
        let total = self
            .total_issued
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::invariant("total issued below account balance"))?;
        Ok((balance, total))
    }

    /// Subtract `amount` from `account` and from the total. Returns the new balance.
    pub fn debit(&mut self, account: AccountId, amount: Amount) -> LedgerResult<Amount> {
        let (balance, total) = self.check_debit(account, amount)?;
        self.balances.insert(account, balance);
        self.total_issued = total;
        Ok(balance)
    }

    /// Validate a supply-neutral move.
    pub fn check_move(&self, from: AccountId, to: AccountId, amount: Amount) -> LedgerResult<()> {
        ensure_not_null(from, "move source")?;
        ensure_not_null(to, "move destination")?;

        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                available,
                required: amount,
            });
        }
        if from != to {
            self.balance_of(to)
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
        }
        Ok(())
    }

    /// Move `amount` from `from` to `to`. `from == to` is a net no-op.
    pub fn move_balance(&mut self, from: AccountId, to: AccountId, amount: Amount) -> LedgerResult<()> {
        self.check_move(from, to, amount)?;
        if from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(from).saturating_sub(amount);
        let to_balance = self.balance_of(to).saturating_add(amount);
        self.balances.insert(from, from_balance);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    /// Stage a batch credit: post-batch balances for every touched account and
    /// the post-batch total. Repeated accounts accumulate.
    pub fn check_credit_batch(
        &self,
        credits: &[Credit],
    ) -> LedgerResult<(BTreeMap<AccountId, Amount>, Amount)> {
        let mut staged: BTreeMap<AccountId, Amount> = BTreeMap::new();
        let mut total = self.total_issued;

        for (idx, credit) in credits.iter().enumerate() {
            if credit.account.is_null() {
                return Err(LedgerError::invalid_target(format!(
                    "batch credit {idx} targets the null account"
                )));
            }
            let current = staged
                .get(&credit.account)
                .copied()
                .unwrap_or_else(|| self.balance_of(credit.account));
            let next = current.checked_add(credit.amount).ok_or(LedgerError::Overflow)?;
            total = total.checked_add(credit.amount).ok_or(LedgerError::Overflow)?;
            staged.insert(credit.account, next);
        }

        Ok((staged, total))
    }

    /// All-or-nothing multi-credit. Returns the new total.
    pub fn credit_batch(&mut self, credits: &[Credit]) -> LedgerResult<Amount> {
        let (staged, total) = self.check_credit_batch(credits)?;
        self.balances.extend(staged);
        self.total_issued = total;
        Ok(total)
    }

    /// Accounts with a non-zero balance, in stable order.
    pub fn holders(&self) -> Vec<(AccountId, Amount)> {
        let mut holders: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(account, amount)| (*account, *amount))
            .collect();
        holders.sort_by_key(|(account, _)| *account);
        holders
    }

    pub fn sum_of_balances(&self) -> LedgerResult<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(*amount))
            .ok_or_else(|| LedgerError::invariant("sum of balances overflows"))
    }

    /// Check `total_issued == Σ balances`.
    pub fn verify(&self) -> LedgerResult<()> {
        let sum = self.sum_of_balances()?;
        if sum != self.total_issued {
            return Err(LedgerError::invariant(format!(
                "total issued {} != sum of balances {}",
                self.total_issued, sum
            )));
        }
        Ok(())
    }
}

fn ensure_not_null(account: AccountId, what: &str) -> LedgerResult<()> {
    if account.is_null() {
        return Err(LedgerError::invalid_target(format!("{what} uses the null account")));
    }
    Ok(())
}
