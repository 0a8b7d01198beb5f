//! Mint/burn handlers: role-gated issuance and destruction of supply.

use chrono::{DateTime, Utc};

use tally_auth::Role;
use tally_core::{AccountId, Amount, LedgerError, LedgerResult};

use crate::supply::Credit;
use crate::token::{
    BatchMint, BatchMintRecord, Burn, BurnFrom, BurnRecord, Mint, MintRecord, Token, TokenEvent,
};

impl Token {
    pub(crate) fn handle_mint(&self, cmd: &Mint) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.roles.require(Role::Minter, cmd.caller)?;
        if cmd.target.is_null() {
            return Err(LedgerError::invalid_target("cannot mint to the null account"));
        }
        if cmd.amount.is_zero() {
            return Ok(vec![]);
        }

        let (_, total_issued) = self.supply.check_credit(cmd.target, cmd.amount)?;

        Ok(vec![TokenEvent::Minted(MintRecord {
            ledger_id: self.id,
            actor: cmd.caller,
            target: cmd.target,
            amount: cmd.amount,
            total_issued,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Stage every credit before emitting anything: one overflowing leg
    /// rejects the whole batch.
    pub(crate) fn handle_batch_mint(&self, cmd: &BatchMint) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.roles.require(Role::Minter, cmd.caller)?;
        if cmd.targets.len() != cmd.amounts.len() {
            return Err(LedgerError::invalid_input(format!(
                "batch has {} targets but {} amounts",
                cmd.targets.len(),
                cmd.amounts.len()
            )));
        }

        let credits: Vec<Credit> = cmd
            .targets
            .iter()
            .zip(&cmd.amounts)
            .map(|(account, amount)| Credit {
                account: *account,
                amount: *amount,
            })
            .collect();

        let (_, total_issued) = self.supply.check_credit_batch(&credits)?;
        if total_issued == self.supply.total_issued() {
            // Empty batch or only zero amounts.
            return Ok(vec![]);
        }

        Ok(vec![TokenEvent::BatchMinted(BatchMintRecord {
            ledger_id: self.id,
            actor: cmd.caller,
            credits,
            total_issued,
            occurred_at: cmd.occurred_at,
        })])
    }

    pub(crate) fn handle_burn(&self, cmd: &Burn) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.burn_events(cmd.caller, cmd.caller, cmd.amount, cmd.occurred_at)
    }

    pub(crate) fn handle_burn_from(&self, cmd: &BurnFrom) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.roles.require(Role::Burner, cmd.caller)?;
        self.burn_events(cmd.caller, cmd.target, cmd.amount, cmd.occurred_at)
    }

    fn burn_events(
        &self,
        actor: AccountId,
        target: AccountId,
        amount: Amount,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<Vec<TokenEvent>> {
        let (_, total_issued) = self.supply.check_debit(target, amount)?;
        if amount.is_zero() {
            return Ok(vec![]);
        }

        Ok(vec![TokenEvent::Burned(BurnRecord {
            ledger_id: self.id,
            actor,
            target,
            amount,
            total_issued,
            occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use tally_core::{Aggregate, LedgerId};
    use tally_events::execute;

    use super::*;
    use crate::token::{GrantRole, Initialize, TokenCommand};

    fn whole(n: u128) -> Amount {
        Amount::from_whole(n).unwrap()
    }

    fn initialized(admin: AccountId) -> Token {
        let ledger_id = LedgerId::new();
        let mut token = Token::empty(ledger_id);
        execute(
            &mut token,
            &TokenCommand::Initialize(Initialize {
                ledger_id,
                admin,
                name: "Tally".to_string(),
                symbol: "TLY".to_string(),
                initial_supply: crate::DEFAULT_INITIAL_SUPPLY,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        token
    }

    fn mint(caller: AccountId, target: AccountId, amount: Amount) -> TokenCommand {
        TokenCommand::Mint(Mint {
            caller,
            target,
            amount,
            occurred_at: Utc::now(),
        })
    }

    fn batch(caller: AccountId, targets: Vec<AccountId>, amounts: Vec<Amount>) -> TokenCommand {
        TokenCommand::BatchMint(BatchMint {
            caller,
            targets,
            amounts,
            occurred_at: Utc::now(),
        })
    }

    fn grant(token: &mut Token, admin: AccountId, role: Role, account: AccountId) {
        execute(
            token,
            &TokenCommand::GrantRole(GrantRole {
                caller: admin,
                role,
                account,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn granted_minter_mints_and_supply_grows() {
        let admin = AccountId::new();
        let minter = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        grant(&mut token, admin, Role::Minter, minter);
        let supply_before = token.total_supply();

        let events = execute(&mut token, &mint(minter, user, whole(1000))).unwrap();

        assert_eq!(token.balance_of(user), whole(1000));
        assert_eq!(
            token.total_supply(),
            supply_before.checked_add(whole(1000)).unwrap()
        );
        match &events[..] {
            [TokenEvent::Minted(record)] => {
                assert_eq!(record.actor, minter);
                assert_eq!(record.total_issued, token.total_supply());
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn mint_without_role_is_unauthorized_and_changes_nothing() {
        let admin = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        let before = token.clone();

        let err = execute(&mut token, &mint(user, user, whole(1))).unwrap_err();
        assert_eq!(err, LedgerError::unauthorized("MINTER", user));
        assert_eq!(token, before);
    }

    #[test]
    fn zero_mint_is_a_silent_success() {
        let admin = AccountId::new();
        let token = initialized(admin);
        let events = token.handle(&mint(admin, AccountId::new(), Amount::ZERO)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn mint_to_null_account_is_rejected() {
        let admin = AccountId::new();
        let token = initialized(admin);
        let err = token.handle(&mint(admin, AccountId::NULL, whole(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTarget(_)));
    }

    #[test]
    fn mint_overflow_is_rejected() {
        let admin = AccountId::new();
        let token = initialized(admin);
        let err = token.handle(&mint(admin, AccountId::new(), Amount::MAX)).unwrap_err();
        assert_eq!(err, LedgerError::Overflow);
    }

    #[test]
    fn batch_mint_credits_every_target_in_one_event() {
        let admin = AccountId::new();
        let user = AccountId::new();
        let minter = AccountId::new();
        let mut token = initialized(admin);

        let events = execute(
            &mut token,
            &batch(admin, vec![user, minter], vec![whole(1000), whole(2000)]),
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(token.balance_of(user), whole(1000));
        assert_eq!(token.balance_of(minter), whole(2000));
        token.supply().verify().unwrap();
    }

    #[test]
    fn batch_with_mismatched_lengths_is_invalid_input() {
        let admin = AccountId::new();
        let mut token = initialized(admin);
        let before = token.clone();

        let err = execute(
            &mut token,
            &batch(admin, vec![AccountId::new(), AccountId::new()], vec![whole(1)]),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(token, before);
    }

    #[test]
    fn batch_overflow_on_second_of_three_leaves_state_unchanged() {
        let admin = AccountId::new();
        let (a, b, c) = (AccountId::new(), AccountId::new(), AccountId::new());
        let mut token = initialized(admin);
        let headroom = Amount::MAX.saturating_sub(token.total_supply());
        let before = token.clone();

        // First leg fits, second pushes the total past the maximum.
        let err = execute(
            &mut token,
            &batch(admin, vec![a, b, c], vec![whole(1), headroom, whole(1)]),
        )
        .unwrap_err();

        assert_eq!(err, LedgerError::Overflow);
        assert_eq!(token, before);
        for account in [a, b, c] {
            assert_eq!(token.balance_of(account), Amount::ZERO);
        }
    }

    #[test]
    fn batch_rejects_null_targets_wholesale() {
        let admin = AccountId::new();
        let token = initialized(admin);
        let err = token
            .handle(&batch(
                admin,
                vec![AccountId::new(), AccountId::NULL],
                vec![whole(1), whole(1)],
            ))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTarget(_)));
    }

    #[test]
    fn empty_or_all_zero_batch_is_a_no_op() {
        let admin = AccountId::new();
        let token = initialized(admin);
        assert!(token.handle(&batch(admin, vec![], vec![])).unwrap().is_empty());
        assert!(
            token
                .handle(&batch(admin, vec![AccountId::new()], vec![Amount::ZERO]))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn burn_reduces_balance_and_supply() {
        let admin = AccountId::new();
        let mut token = initialized(admin);
        let balance = token.balance_of(admin);
        let supply = token.total_supply();

        execute(
            &mut token,
            &TokenCommand::Burn(Burn {
                caller: admin,
                amount: whole(1000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(token.balance_of(admin), balance.checked_sub(whole(1000)).unwrap());
        assert_eq!(token.total_supply(), supply.checked_sub(whole(1000)).unwrap());
    }

    #[test]
    fn over_burn_is_insufficient_balance() {
        let admin = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        execute(&mut token, &mint(admin, user, whole(5))).unwrap();
        let before = token.clone();

        let err = execute(
            &mut token,
            &TokenCommand::Burn(Burn {
                caller: user,
                amount: whole(6),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance { account, .. } if account == user));
        assert_eq!(token, before);
    }

    #[test]
    fn burn_from_requires_burner() {
        let admin = AccountId::new();
        let burner = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        execute(&mut token, &mint(admin, user, whole(10))).unwrap();

        let burn_from = |caller| {
            TokenCommand::BurnFrom(BurnFrom {
                caller,
                target: user,
                amount: whole(4),
                occurred_at: Utc::now(),
            })
        };

        let err = execute(&mut token, &burn_from(burner)).unwrap_err();
        assert_eq!(err, LedgerError::unauthorized("BURNER", burner));

        grant(&mut token, admin, Role::Burner, burner);
        let events = execute(&mut token, &burn_from(burner)).unwrap();
        assert_eq!(token.balance_of(user), whole(6));
        match &events[..] {
            [TokenEvent::Burned(record)] => {
                assert_eq!(record.actor, burner);
                assert_eq!(record.target, user);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }
}
