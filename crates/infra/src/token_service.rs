//! Single-writer command pipeline for one ledger.
//!
//! ```text
//! Command
//!   ↓
//! 1. Decide: Token::handle (authorize + validate, no mutation)
//!   ↓
//! 2. Persist: append to the event store (ExpectedVersion::Exact)
//!   ↓
//! 3. Evolve: apply the committed events to the in-memory aggregate
//!   ↓
//! 4. Publish: envelopes to the bus (projections, audit sinks)
//! ```
//!
//! All four steps run while holding the aggregate's mutex, so commands are
//! strictly sequential and no caller observes another command half-applied.
//! A rejected command writes nothing and publishes nothing.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use tally_auth::{AuthorizationExplanation, Role, explain_authorization};
use tally_core::{
    AccountId, Aggregate, AggregateRoot, Amount, ExpectedVersion, LedgerError, LedgerId,
    LedgerResult,
};
use tally_events::{EventBus, EventEnvelope, Subscription};
use tally_token::{
    AGGREGATE_TYPE, BatchMint, Burn, BurnFrom, GrantRole, Initialize, Mint, RenounceRole,
    RevokeRole, Token, TokenCommand, TokenEvent, TokenMetadata, Transfer,
};

use crate::config::LedgerConfig;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The command was rejected; nothing was written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A stored payload could not be decoded into a `TokenEvent`.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// The stream is out of order, belongs to another ledger, or holds an
    /// event that cannot be replayed onto the state before it.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Publication failed after a successful append.
    ///
    /// Unlike every other variant this does not mean the command was
    /// rejected: its events are persisted and applied, only delivery to the
    /// bus is incomplete. Consumers recover by replaying the stream.
    #[error("event publication failed after commit: {0}")]
    Publish(String),

    #[error("ledger state lock poisoned")]
    Poisoned,
}

impl ServiceError {
    /// The ledger rejection, if this error is one.
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            ServiceError::Ledger(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> From<PoisonError<T>> for ServiceError {
    fn from(_: PoisonError<T>) -> Self {
        ServiceError::Poisoned
    }
}

/// Owns one ledger: its aggregate state, its event stream and its bus.
///
/// `S` and `B` are the store and bus implementations; tests use
/// `InMemoryEventStore` and `InMemoryEventBus`.
#[derive(Debug)]
pub struct TokenService<S, B> {
    ledger_id: LedgerId,
    store: S,
    bus: B,
    token: Mutex<Token>,
}

impl<S, B> TokenService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Open a ledger by replaying its stream. An unknown ledger opens empty
    /// (not yet initialized).
    pub fn open(ledger_id: LedgerId, store: S, bus: B) -> Result<Self, ServiceError> {
        let token = load_token(&store, ledger_id)?;
        tracing::debug!(%ledger_id, version = token.version(), "ledger opened");
        Ok(Self {
            ledger_id,
            store,
            bus,
            token: Mutex::new(token),
        })
    }

    /// Open the configured ledger and initialize it if it has no history.
    pub fn bootstrap(config: &LedgerConfig, store: S, bus: B) -> Result<Self, ServiceError> {
        let service = Self::open(config.ledger_id, store, bus)?;
        if service.is_initialized() {
            tracing::info!(ledger_id = %config.ledger_id, "ledger already initialized; skipping bootstrap");
            return Ok(service);
        }
        service.initialize(
            config.admin,
            &config.name,
            &config.symbol,
            config.initial_supply,
        )?;
        Ok(service)
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Subscribe to envelopes published after this call.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.bus.subscribe()
    }

    /// Run a command through decide → append → apply → publish.
    ///
    /// Returns the committed events (empty for a no-op command).
    pub fn dispatch(&self, command: TokenCommand) -> Result<Vec<StoredEvent>, ServiceError> {
        let mut token = self.token.lock()?;

        let decided = match token.handle(&command) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(
                    ledger_id = %self.ledger_id,
                    command = command.name(),
                    caller = %command.caller(),
                    kind = err.kind(),
                    %err,
                    "command rejected"
                );
                return Err(err.into());
            }
        };
        if decided.is_empty() {
            tracing::debug!(ledger_id = %self.ledger_id, command = command.name(), "command was a no-op");
            return Ok(vec![]);
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(self.ledger_id, AGGREGATE_TYPE, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let expected = ExpectedVersion::Exact(token.version());
        let committed = match self.store.append(uncommitted, expected) {
            Ok(committed) => committed,
            Err(err) => {
                if matches!(err, EventStoreError::Concurrency(_)) {
                    // Another writer moved the stream; pick up its events so
                    // the next command decides against current state.
                    *token = load_token(&self.store, self.ledger_id)?;
                }
                tracing::warn!(ledger_id = %self.ledger_id, command = command.name(), %err, "append failed");
                return Err(err.into());
            }
        };

        for (ev, stored) in decided.iter().zip(&committed) {
            if let Err(err) = token.try_apply(ev) {
                tracing::error!(
                    ledger_id = %self.ledger_id,
                    sequence_number = stored.sequence_number,
                    %err,
                    "committed event could not be applied"
                );
                return Err(ServiceError::CorruptStream(format!(
                    "event {} could not be applied: {err}",
                    stored.sequence_number
                )));
            }
        }

        tracing::info!(
            ledger_id = %self.ledger_id,
            command = command.name(),
            caller = %command.caller(),
            events = committed.len(),
            version = token.version(),
            total_supply = %token.total_supply(),
            "command committed"
        );

        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    ledger_id = %self.ledger_id,
                    sequence_number = stored.sequence_number,
                    error = ?e,
                    "publication failed after commit"
                );
                return Err(ServiceError::Publish(format!("{e:?}")));
            }
        }

        Ok(committed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    pub fn initialize(
        &self,
        admin: AccountId,
        name: &str,
        symbol: &str,
        initial_supply: Amount,
    ) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::Initialize(Initialize {
            ledger_id: self.ledger_id,
            admin,
            name: name.to_string(),
            symbol: symbol.to_string(),
            initial_supply,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn mint(&self, caller: AccountId, target: AccountId, amount: Amount) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::Mint(Mint {
            caller,
            target,
            amount,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    /// Credit every `(targets[i], amounts[i])` pair atomically.
    pub fn batch_mint(
        &self,
        caller: AccountId,
        targets: Vec<AccountId>,
        amounts: Vec<Amount>,
    ) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::BatchMint(BatchMint {
            caller,
            targets,
            amounts,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn burn(&self, caller: AccountId, amount: Amount) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::Burn(Burn {
            caller,
            amount,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn burn_from(&self, caller: AccountId, target: AccountId, amount: Amount) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::BurnFrom(BurnFrom {
            caller,
            target,
            amount,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn transfer(&self, caller: AccountId, to: AccountId, amount: Amount) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::Transfer(Transfer {
            caller,
            to,
            amount,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn grant_role(&self, caller: AccountId, role: Role, account: AccountId) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::GrantRole(GrantRole {
            caller,
            role,
            account,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn revoke_role(&self, caller: AccountId, role: Role, account: AccountId) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::RevokeRole(RevokeRole {
            caller,
            role,
            account,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn renounce_role(&self, caller: AccountId, role: Role) -> Result<(), ServiceError> {
        self.dispatch(TokenCommand::RenounceRole(RenounceRole {
            caller,
            role,
            occurred_at: Utc::now(),
        }))
        .map(drop)
    }

    pub fn grant_minter_role(&self, caller: AccountId, account: AccountId) -> Result<(), ServiceError> {
        self.grant_role(caller, Role::Minter, account)
    }

    pub fn revoke_minter_role(&self, caller: AccountId, account: AccountId) -> Result<(), ServiceError> {
        self.revoke_role(caller, Role::Minter, account)
    }

    pub fn grant_burner_role(&self, caller: AccountId, account: AccountId) -> Result<(), ServiceError> {
        self.grant_role(caller, Role::Burner, account)
    }

    pub fn revoke_burner_role(&self, caller: AccountId, account: AccountId) -> Result<(), ServiceError> {
        self.revoke_role(caller, Role::Burner, account)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn name(&self) -> Option<String> {
        self.read().name().map(str::to_string)
    }

    pub fn symbol(&self) -> Option<String> {
        self.read().symbol().map(str::to_string)
    }

    pub fn decimals(&self) -> u8 {
        self.read().decimals()
    }

    pub fn metadata(&self) -> Option<TokenMetadata> {
        self.read().metadata().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.read().is_initialized()
    }

    pub fn total_supply(&self) -> Amount {
        self.read().total_supply()
    }

    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.read().balance_of(account)
    }

    pub fn has_role(&self, role: Role, account: AccountId) -> bool {
        self.read().has_role(role, account)
    }

    /// Why `account` does or does not satisfy `role`.
    pub fn explain_role(&self, role: Role, account: AccountId) -> AuthorizationExplanation {
        explain_authorization(self.read().roles(), role, account)
    }

    /// Accounts with a non-zero balance.
    pub fn holders(&self) -> Vec<(AccountId, Amount)> {
        self.read().supply().holders()
    }

    pub fn version(&self) -> u64 {
        self.read().version()
    }

    /// Copy of the current aggregate state.
    pub fn snapshot(&self) -> Token {
        self.read().clone()
    }

    /// Check the supply identity against the live state.
    pub fn verify(&self) -> LedgerResult<()> {
        self.read().supply().verify()
    }

    /// The persisted stream as envelopes, e.g. to rebuild a projection.
    pub fn replay(&self) -> Result<Vec<EventEnvelope<JsonValue>>, ServiceError> {
        Ok(self
            .store
            .load_stream(self.ledger_id)?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect())
    }

    // Queries never leave state half-written (apply happens per event after
    // append), so a poisoned lock still guards consistent data.
    fn read(&self) -> MutexGuard<'_, Token> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rehydrate a token from its stored stream.
fn load_token<S: EventStore>(store: &S, ledger_id: LedgerId) -> Result<Token, ServiceError> {
    let history = store.load_stream(ledger_id)?;
    validate_loaded_stream(ledger_id, &history)?;

    let mut token = Token::empty(ledger_id);
    for stored in history {
        let seq = stored.sequence_number;
        let ev: TokenEvent = serde_json::from_value(stored.payload)
            .map_err(|e| ServiceError::Deserialize(e.to_string()))?;
        if ev.ledger_id() != ledger_id {
            return Err(ServiceError::CorruptStream(format!(
                "event {seq} carries ledger_id {}, stream is {ledger_id}",
                ev.ledger_id()
            )));
        }
        token
            .try_apply(&ev)
            .map_err(|err| ServiceError::CorruptStream(format!("event {seq} cannot be replayed: {err}")))?;
    }
    Ok(token)
}

fn validate_loaded_stream(ledger_id: LedgerId, stream: &[StoredEvent]) -> Result<(), ServiceError> {
    for (idx, e) in stream.iter().enumerate() {
        if e.ledger_id != ledger_id {
            return Err(ServiceError::CorruptStream(format!(
                "loaded stream contains wrong ledger_id at index {idx}"
            )));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(ServiceError::CorruptStream(format!(
                "expected sequence_number {expected}, found {} at index {idx}",
                e.sequence_number
            )));
        }
    }
    Ok(())
}
