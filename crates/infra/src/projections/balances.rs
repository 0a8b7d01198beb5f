//! Balances projection: per-holder balances and total supply per ledger.
//!
//! Consumes the JSON envelopes published by `TokenService`. Each ledger
//! stream is folded by a typed [`ProjectionRunner`] over a [`BalanceSheet`],
//! so stream pinning and sequence ordering come from the runner.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use tally_core::{AccountId, Amount, LedgerError, LedgerId, LedgerResult};
use tally_events::{EventEnvelope, Projection, ProjectionError, ProjectionRunner, Subscription};
use tally_token::TokenEvent;

#[derive(Debug, Error)]
pub enum BalancesProjectionError {
    #[error("failed to deserialize token event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("sequence gap (last={last}, found={found})")]
    SequenceGap { last: u64, found: u64 },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("projection state lock poisoned")]
    Poisoned,
}

/// Read model for one ledger: balances of every account ever credited, and
/// the running supply.
///
/// Arithmetic saturates; a read model never rejects an event. Disagreement
/// with the supply identity is reported by [`BalanceSheet::audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSheet {
    balances: BTreeMap<AccountId, Amount>,
    total_supply: Amount,
}

impl BalanceSheet {
    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.balances.get(&account).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Accounts with a non-zero balance, ordered by account id.
    pub fn holders(&self) -> Vec<(AccountId, Amount)> {
        self.balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(account, amount)| (*account, *amount))
            .collect()
    }

    /// Check `total_supply == Σ balances`.
    pub fn audit(&self) -> LedgerResult<()> {
        let sum = self
            .balances
            .values()
            .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(*amount))
            .ok_or(LedgerError::Overflow)?;
        if sum != self.total_supply {
            return Err(LedgerError::invariant(format!(
                "projected total supply {} differs from sum of balances {}",
                self.total_supply, sum
            )));
        }
        Ok(())
    }

    fn credit(&mut self, account: AccountId, amount: Amount) {
        let balance = self.balances.entry(account).or_insert(Amount::ZERO);
        *balance = balance.saturating_add(amount);
        self.total_supply = self.total_supply.saturating_add(amount);
    }

    fn debit(&mut self, account: AccountId, amount: Amount) {
        let balance = self.balances.entry(account).or_insert(Amount::ZERO);
        *balance = balance.saturating_sub(amount);
        self.total_supply = self.total_supply.saturating_sub(amount);
    }

    fn shift(&mut self, from: AccountId, to: AccountId, amount: Amount) {
        if from == to {
            return;
        }
        let source = self.balances.entry(from).or_insert(Amount::ZERO);
        *source = source.saturating_sub(amount);
        let target = self.balances.entry(to).or_insert(Amount::ZERO);
        *target = target.saturating_add(amount);
    }
}

impl Projection for BalanceSheet {
    type Ev = TokenEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        match envelope.payload() {
            TokenEvent::Initialized(e) => {
                *self = BalanceSheet::default();
                self.credit(e.admin, e.initial_supply);
            }
            TokenEvent::Minted(e) => self.credit(e.target, e.amount),
            TokenEvent::BatchMinted(e) => {
                for c in &e.credits {
                    self.credit(c.account, c.amount);
                }
            }
            TokenEvent::Burned(e) => self.debit(e.target, e.amount),
            TokenEvent::Transferred(e) => self.shift(e.from, e.to, e.amount),
            TokenEvent::RoleGranted(_) | TokenEvent::RoleRevoked(_) => {}
        }
    }
}

/// Balances projection across ledgers.
///
/// - One runner (and cursor) per ledger stream
/// - Redelivered envelopes (sequence <= cursor) are ignored
/// - Gaps in a stream are rejected
/// - Rebuildable from scratch by replaying envelopes
#[derive(Debug, Default)]
pub struct BalancesProjection {
    ledgers: RwLock<HashMap<LedgerId, ProjectionRunner<BalanceSheet>>>,
}

impl BalancesProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a published envelope.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), BalancesProjectionError> {
        let ledger_id = envelope.ledger_id();
        let seq = envelope.sequence_number();

        let mut ledgers = self
            .ledgers
            .write()
            .map_err(|_| BalancesProjectionError::Poisoned)?;
        let last = ledgers
            .get(&ledger_id)
            .and_then(|runner| runner.cursor())
            .map(|c| c.last_sequence_number())
            .unwrap_or(0);

        if seq <= last {
            tracing::debug!(%ledger_id, seq, last, "skipping redelivered envelope");
            return Ok(());
        }
        if seq != last + 1 {
            return Err(BalancesProjectionError::SequenceGap { last, found: seq });
        }

        let event: TokenEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| BalancesProjectionError::Deserialize(e.to_string()))?;
        if event.ledger_id() != ledger_id {
            return Err(BalancesProjectionError::StreamMismatch(format!(
                "event ledger_id {} does not match envelope ledger_id {ledger_id}",
                event.ledger_id()
            )));
        }

        let typed = envelope.clone().map(|_| event);
        ledgers
            .entry(ledger_id)
            .or_insert_with(|| ProjectionRunner::new_for_ledger(ledger_id, BalanceSheet::default()))
            .apply(&typed)?;
        Ok(())
    }

    /// Apply everything currently queued on a bus subscription. Returns the
    /// number of envelopes consumed.
    pub fn catch_up(
        &self,
        subscription: &Subscription<EventEnvelope<JsonValue>>,
    ) -> Result<usize, BalancesProjectionError> {
        let pending = subscription.drain();
        for envelope in &pending {
            self.apply_envelope(envelope)?;
        }
        Ok(pending.len())
    }

    /// Drop all state and replay `envelopes` in (ledger, sequence) order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), BalancesProjectionError> {
        self.ledgers
            .write()
            .map_err(|_| BalancesProjectionError::Poisoned)?
            .clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.ledger_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }

    /// Snapshot of one ledger's read model.
    pub fn sheet(&self, ledger_id: LedgerId) -> Option<BalanceSheet> {
        self.ledgers
            .read()
            .ok()?
            .get(&ledger_id)
            .map(|runner| runner.projection().clone())
    }

    pub fn balance_of(&self, ledger_id: LedgerId, account: AccountId) -> Amount {
        self.sheet(ledger_id)
            .map(|s| s.balance_of(account))
            .unwrap_or(Amount::ZERO)
    }

    pub fn total_supply(&self, ledger_id: LedgerId) -> Amount {
        self.sheet(ledger_id)
            .map(|s| s.total_supply())
            .unwrap_or(Amount::ZERO)
    }

    pub fn holders(&self, ledger_id: LedgerId) -> Vec<(AccountId, Amount)> {
        self.sheet(ledger_id).map(|s| s.holders()).unwrap_or_default()
    }

    /// Last applied sequence number for a ledger (0 if none).
    pub fn position(&self, ledger_id: LedgerId) -> u64 {
        self.ledgers
            .read()
            .ok()
            .and_then(|ledgers| ledgers.get(&ledger_id).and_then(|r| r.cursor()))
            .map(|c| c.last_sequence_number())
            .unwrap_or(0)
    }

    /// Verify the supply identity for a ledger's read model.
    pub fn audit(&self, ledger_id: LedgerId) -> LedgerResult<()> {
        match self.sheet(ledger_id) {
            Some(sheet) => sheet.audit(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use tally_token::{Initialized, MintRecord, TokenMetadata, Transferred};

    fn envelope(ledger_id: LedgerId, seq: u64, event: &TokenEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            ledger_id,
            tally_token::AGGREGATE_TYPE,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn initialized(ledger_id: LedgerId, admin: AccountId, supply: u128) -> TokenEvent {
        TokenEvent::Initialized(Initialized {
            ledger_id,
            admin,
            metadata: TokenMetadata {
                name: "Tally".to_string(),
                symbol: "TLY".to_string(),
                decimals: 8,
            },
            initial_supply: Amount::from_units(supply),
            occurred_at: Utc::now(),
        })
    }

    fn minted(ledger_id: LedgerId, actor: AccountId, target: AccountId, amount: u128) -> TokenEvent {
        TokenEvent::Minted(MintRecord {
            ledger_id,
            actor,
            target,
            amount: Amount::from_units(amount),
            total_issued: Amount::ZERO,
            occurred_at: Utc::now(),
        })
    }

    fn transferred(ledger_id: LedgerId, from: AccountId, to: AccountId, amount: u128) -> TokenEvent {
        TokenEvent::Transferred(Transferred {
            ledger_id,
            from,
            to,
            amount: Amount::from_units(amount),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn folds_balances_and_supply() {
        let ledger = LedgerId::new();
        let admin = AccountId::new();
        let user = AccountId::new();
        let proj = BalancesProjection::new();

        proj.apply_envelope(&envelope(ledger, 1, &initialized(ledger, admin, 1_000))).unwrap();
        proj.apply_envelope(&envelope(ledger, 2, &minted(ledger, admin, user, 50))).unwrap();
        proj.apply_envelope(&envelope(ledger, 3, &transferred(ledger, admin, user, 100))).unwrap();

        assert_eq!(proj.balance_of(ledger, admin).units(), 900);
        assert_eq!(proj.balance_of(ledger, user).units(), 150);
        assert_eq!(proj.total_supply(ledger).units(), 1_050);
        assert_eq!(proj.position(ledger), 3);
        assert!(proj.audit(ledger).is_ok());
    }

    #[test]
    fn redelivery_is_idempotent() {
        let ledger = LedgerId::new();
        let admin = AccountId::new();
        let proj = BalancesProjection::new();
        let env = envelope(ledger, 1, &initialized(ledger, admin, 10));

        proj.apply_envelope(&env).unwrap();
        proj.apply_envelope(&env).unwrap();

        assert_eq!(proj.total_supply(ledger).units(), 10);
        assert_eq!(proj.holders(ledger), vec![(admin, Amount::from_units(10))]);
    }

    #[test]
    fn gaps_are_rejected() {
        let ledger = LedgerId::new();
        let admin = AccountId::new();
        let proj = BalancesProjection::new();
        proj.apply_envelope(&envelope(ledger, 1, &initialized(ledger, admin, 10))).unwrap();

        let err = proj
            .apply_envelope(&envelope(ledger, 3, &minted(ledger, admin, admin, 1)))
            .unwrap_err();
        assert!(matches!(err, BalancesProjectionError::SequenceGap { last: 1, found: 3 }));
    }

    #[test]
    fn payload_for_another_ledger_is_rejected() {
        let ledger = LedgerId::new();
        let other = LedgerId::new();
        let proj = BalancesProjection::new();

        let err = proj
            .apply_envelope(&envelope(ledger, 1, &initialized(other, AccountId::new(), 10)))
            .unwrap_err();
        assert!(matches!(err, BalancesProjectionError::StreamMismatch(_)));
        assert_eq!(proj.position(ledger), 0);
    }

    #[test]
    fn rebuild_replays_out_of_order_input() {
        let ledger = LedgerId::new();
        let admin = AccountId::new();
        let user = AccountId::new();
        let envs = vec![
            envelope(ledger, 2, &transferred(ledger, admin, user, 4)),
            envelope(ledger, 1, &initialized(ledger, admin, 10)),
        ];

        let proj = BalancesProjection::new();
        proj.rebuild_from_scratch(envs.clone()).unwrap();
        proj.rebuild_from_scratch(envs).unwrap();

        assert_eq!(proj.balance_of(ledger, user).units(), 4);
        assert_eq!(proj.total_supply(ledger).units(), 10);
    }

    #[test]
    fn audit_flags_inconsistent_sheet() {
        let mut sheet = BalanceSheet::default();
        sheet.credit(AccountId::new(), Amount::from_units(5));
        sheet.total_supply = Amount::from_units(7);
        assert!(matches!(sheet.audit(), Err(LedgerError::InvariantViolation(_))));
    }
}
