//! Transfer handler: peer-to-peer movement of balance, no role required.

use tally_core::LedgerResult;

use crate::token::{Token, TokenEvent, Transfer, Transferred};

impl Token {
    /// Zero amounts and self-transfers succeed without an event; a
    /// self-transfer still has to be covered by the caller's balance.
    pub(crate) fn handle_transfer(&self, cmd: &Transfer) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.supply.check_move(cmd.caller, cmd.to, cmd.amount)?;
        if cmd.amount.is_zero() || cmd.caller == cmd.to {
            return Ok(vec![]);
        }

        Ok(vec![TokenEvent::Transferred(Transferred {
            ledger_id: self.id,
            from: cmd.caller,
            to: cmd.to,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tally_core::{AccountId, Aggregate, Amount, LedgerError, LedgerId};
    use tally_events::execute;

    use super::*;
    use crate::token::{Initialize, TokenCommand};

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
                initial_supply: whole(10_000),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        token
    }

    fn transfer(caller: AccountId, to: AccountId, amount: Amount) -> TokenCommand {
        TokenCommand::Transfer(Transfer {
            caller,
            to,
            amount,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn transfer_moves_value_and_keeps_supply() {
        let admin = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        let supply = token.total_supply();

        let events = execute(&mut token, &transfer(admin, user, whole(1000))).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(token.balance_of(user), whole(1000));
        assert_eq!(token.balance_of(admin), whole(9_000));
        assert_eq!(token.total_supply(), supply);
    }

    #[test]
    fn ordinary_accounts_can_transfer_onwards() {
        let admin = AccountId::new();
        let alice = AccountId::new();
        let bob = AccountId::new();
        let mut token = initialized(admin);
        execute(&mut token, &transfer(admin, alice, whole(10))).unwrap();

        execute(&mut token, &transfer(alice, bob, whole(4))).unwrap();
        assert_eq!(token.balance_of(alice), whole(6));
        assert_eq!(token.balance_of(bob), whole(4));
    }

    #[test]
    fn transfer_beyond_balance_is_rejected() {
        let admin = AccountId::new();
        let user = AccountId::new();
        let mut token = initialized(admin);
        let before = token.clone();

        let err = execute(&mut token, &transfer(user, admin, whole(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(token, before);
    }

    #[test]
    fn transfer_to_null_account_is_rejected() {
        let admin = AccountId::new();
        let token = initialized(admin);
        let err = token
            .handle(&transfer(admin, AccountId::NULL, whole(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTarget(_)));
    }

    #[test]
    fn zero_and_self_transfers_are_silent_no_ops() {
        let admin = AccountId::new();
        let token = initialized(admin);

        assert!(token.handle(&transfer(admin, AccountId::new(), Amount::ZERO)).unwrap().is_empty());
        assert!(token.handle(&transfer(admin, admin, whole(5))).unwrap().is_empty());
        assert!(matches!(
            token.handle(&transfer(admin, admin, whole(10_001))),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }
}
