//! The token aggregate: metadata, role registry and supply ledger behind one
//! command/event boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_auth::{Role, RoleRegistry};
use tally_core::{
    AccountId, Aggregate, AggregateRoot, Amount, DECIMALS, LedgerError, LedgerId, LedgerResult,
    UNITS_PER_WHOLE,
};
use tally_events::Event;

use crate::supply::{Credit, SupplyLedger};

/// Stream/aggregate type name used in the event store.
pub const AGGREGATE_TYPE: &str = "token.ledger";

/// Supply minted to the administrator at initialization, in whole units.
pub const INITIAL_SUPPLY_WHOLE: u128 = 1_000_000_000;

/// `INITIAL_SUPPLY_WHOLE` expressed in smallest units.
pub const DEFAULT_INITIAL_SUPPLY: Amount = Amount::from_units(INITIAL_SUPPLY_WHOLE * UNITS_PER_WHOLE);

/// Static token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Aggregate root: Token.
///
/// State is only ever changed by applying events produced by `handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub(crate) id: LedgerId,
    pub(crate) metadata: Option<TokenMetadata>,
    pub(crate) roles: RoleRegistry,
    pub(crate) supply: SupplyLedger,
    version: u64,
}

impl Token {
    /// Empty, not-yet-initialized aggregate (for rehydration).
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            metadata: None,
            roles: RoleRegistry::new(),
            supply: SupplyLedger::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn metadata(&self) -> Option<&TokenMetadata> {
        self.metadata.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.name.as_str())
    }

    pub fn symbol(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.symbol.as_str())
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn total_supply(&self) -> Amount {
        self.supply.total_issued()
    }

    pub fn balance_of(&self, account: AccountId) -> Amount {
        self.supply.balance_of(account)
    }

    pub fn has_role(&self, role: Role, account: AccountId) -> bool {
        self.roles.has(role, account)
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn supply(&self) -> &SupplyLedger {
        &self.supply
    }

    pub(crate) fn ensure_initialized(&self) -> LedgerResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LedgerError::NotInitialized)
        }
    }
}

impl AggregateRoot for Token {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: Initialize (one-time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialize {
    pub ledger_id: LedgerId,
    pub admin: AccountId,
    pub name: String,
    pub symbol: String,
    pub initial_supply: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Mint (requires MINTER).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub caller: AccountId,
    pub target: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BatchMint (requires MINTER, all-or-nothing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMint {
    pub caller: AccountId,
    pub targets: Vec<AccountId>,
    pub amounts: Vec<Amount>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Burn from the caller's own balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burn {
    pub caller: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BurnFrom another account (requires BURNER).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnFrom {
    pub caller: AccountId,
    pub target: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Transfer from the caller to another account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub caller: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: GrantRole (requires ADMIN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRole {
    pub caller: AccountId,
    pub role: Role,
    pub account: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevokeRole (requires ADMIN).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeRole {
    pub caller: AccountId,
    pub role: Role,
    pub account: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenounceRole (the caller drops one of its own roles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenounceRole {
    pub caller: AccountId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenCommand {
    Initialize(Initialize),
    Mint(Mint),
    BatchMint(BatchMint),
    Burn(Burn),
    BurnFrom(BurnFrom),
    Transfer(Transfer),
    GrantRole(GrantRole),
    RevokeRole(RevokeRole),
    RenounceRole(RenounceRole),
}

impl TokenCommand {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TokenCommand::Initialize(_) => "initialize",
            TokenCommand::Mint(_) => "mint",
            TokenCommand::BatchMint(_) => "batch_mint",
            TokenCommand::Burn(_) => "burn",
            TokenCommand::BurnFrom(_) => "burn_from",
            TokenCommand::Transfer(_) => "transfer",
            TokenCommand::GrantRole(_) => "grant_role",
            TokenCommand::RevokeRole(_) => "revoke_role",
            TokenCommand::RenounceRole(_) => "renounce_role",
        }
    }

    /// The account acting (the administrator for `Initialize`).
    pub fn caller(&self) -> AccountId {
        match self {
            TokenCommand::Initialize(c) => c.admin,
            TokenCommand::Mint(c) => c.caller,
            TokenCommand::BatchMint(c) => c.caller,
            TokenCommand::Burn(c) => c.caller,
            TokenCommand::BurnFrom(c) => c.caller,
            TokenCommand::Transfer(c) => c.caller,
            TokenCommand::GrantRole(c) => c.caller,
            TokenCommand::RevokeRole(c) => c.caller,
            TokenCommand::RenounceRole(c) => c.caller,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Event: Initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initialized {
    pub ledger_id: LedgerId,
    pub admin: AccountId,
    pub metadata: TokenMetadata,
    pub initial_supply: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a single-target mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub ledger_id: LedgerId,
    pub actor: AccountId,
    pub target: AccountId,
    pub amount: Amount,
    /// Total issued after this mint.
    pub total_issued: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: an atomic batch mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMintRecord {
    pub ledger_id: LedgerId,
    pub actor: AccountId,
    pub credits: Vec<Credit>,
    /// Total issued after the whole batch.
    pub total_issued: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a burn (self-service or by a BURNER).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnRecord {
    pub ledger_id: LedgerId,
    pub actor: AccountId,
    pub target: AccountId,
    pub amount: Amount,
    /// Total issued after this burn.
    pub total_issued: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transferred {
    pub ledger_id: LedgerId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event payload for role membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub ledger_id: LedgerId,
    pub actor: AccountId,
    pub role: Role,
    pub account: AccountId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenEvent {
    Initialized(Initialized),
    Minted(MintRecord),
    BatchMinted(BatchMintRecord),
    Burned(BurnRecord),
    Transferred(Transferred),
    RoleGranted(RoleChanged),
    RoleRevoked(RoleChanged),
}

impl TokenEvent {
    pub fn ledger_id(&self) -> LedgerId {
        match self {
            TokenEvent::Initialized(e) => e.ledger_id,
            TokenEvent::Minted(e) => e.ledger_id,
            TokenEvent::BatchMinted(e) => e.ledger_id,
            TokenEvent::Burned(e) => e.ledger_id,
            TokenEvent::Transferred(e) => e.ledger_id,
            TokenEvent::RoleGranted(e) | TokenEvent::RoleRevoked(e) => e.ledger_id,
        }
    }
}

impl Event for TokenEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TokenEvent::Initialized(_) => "token.initialized",
            TokenEvent::Minted(_) => "token.minted",
            TokenEvent::BatchMinted(_) => "token.batch_minted",
            TokenEvent::Burned(_) => "token.burned",
            TokenEvent::Transferred(_) => "token.transferred",
            TokenEvent::RoleGranted(_) => "token.role_granted",
            TokenEvent::RoleRevoked(_) => "token.role_revoked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TokenEvent::Initialized(e) => e.occurred_at,
            TokenEvent::Minted(e) => e.occurred_at,
            TokenEvent::BatchMinted(e) => e.occurred_at,
            TokenEvent::Burned(e) => e.occurred_at,
            TokenEvent::Transferred(e) => e.occurred_at,
            TokenEvent::RoleGranted(e) | TokenEvent::RoleRevoked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Token {
    type Command = TokenCommand;
    type Event = TokenEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        // `handle` validated this event against the same state.
        if let Err(err) = self.try_apply(event) {
            tracing::error!(
                ledger_id = %self.id,
                event_type = event.event_type(),
                %err,
                "event could not be applied to ledger state"
            );
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TokenCommand::Initialize(cmd) => self.handle_initialize(cmd),
            TokenCommand::Mint(cmd) => self.handle_mint(cmd),
            TokenCommand::BatchMint(cmd) => self.handle_batch_mint(cmd),
            TokenCommand::Burn(cmd) => self.handle_burn(cmd),
            TokenCommand::BurnFrom(cmd) => self.handle_burn_from(cmd),
            TokenCommand::Transfer(cmd) => self.handle_transfer(cmd),
            TokenCommand::GrantRole(cmd) => self.handle_grant_role(cmd),
            TokenCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            TokenCommand::RenounceRole(cmd) => self.handle_renounce_role(cmd),
        }
    }
}

impl Token {
    /// Apply one event, rejecting it if it does not fit the current state.
    ///
    /// On error nothing changes, `version` included. Rehydration uses this
    /// to refuse a stream whose events cannot be replayed.
    pub fn try_apply(&mut self, event: &TokenEvent) -> LedgerResult<()> {
        if event.ledger_id() != self.id {
            return Err(LedgerError::invariant(format!(
                "event for ledger {} applied to ledger {}",
                event.ledger_id(),
                self.id
            )));
        }

        match event {
            TokenEvent::Initialized(e) => {
                if self.is_initialized() {
                    return Err(LedgerError::AlreadyInitialized);
                }
                let mut supply = SupplyLedger::new();
                supply.credit(e.admin, e.initial_supply)?;
                self.metadata = Some(e.metadata.clone());
                self.roles = RoleRegistry::with_admin(e.admin);
                self.supply = supply;
            }
            TokenEvent::Minted(e) => {
                self.ensure_initialized()?;
                self.supply.credit(e.target, e.amount)?;
            }
            TokenEvent::BatchMinted(e) => {
                self.ensure_initialized()?;
                self.supply.credit_batch(&e.credits)?;
            }
            TokenEvent::Burned(e) => {
                self.ensure_initialized()?;
                self.supply.debit(e.target, e.amount)?;
            }
            TokenEvent::Transferred(e) => {
                self.ensure_initialized()?;
                self.supply.move_balance(e.from, e.to, e.amount)?;
            }
            TokenEvent::RoleGranted(e) => {
                self.ensure_initialized()?;
                self.roles.insert(e.role, e.account);
            }
            TokenEvent::RoleRevoked(e) => {
                self.ensure_initialized()?;
                self.roles.remove(e.role, e.account);
            }
        }

        self.version += 1;
        Ok(())
    }

    fn handle_initialize(&self, cmd: &Initialize) -> LedgerResult<Vec<TokenEvent>> {
        if self.is_initialized() {
            return Err(LedgerError::AlreadyInitialized);
        }
        if cmd.admin.is_null() {
            return Err(LedgerError::invalid_target("administrator cannot be the null account"));
        }
        if cmd.name.trim().is_empty() {
            return Err(LedgerError::invalid_input("name cannot be empty"));
        }
        if cmd.symbol.trim().is_empty() {
            return Err(LedgerError::invalid_input("symbol cannot be empty"));
        }

        Ok(vec![TokenEvent::Initialized(Initialized {
            ledger_id: cmd.ledger_id,
            admin: cmd.admin,
            metadata: TokenMetadata {
                name: cmd.name.trim().to_string(),
                symbol: cmd.symbol.trim().to_string(),
                decimals: DECIMALS,
            },
            initial_supply: cmd.initial_supply,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_grant_role(&self, cmd: &GrantRole) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.roles.require(Role::Admin, cmd.caller)?;
        if cmd.account.is_null() {
            return Err(LedgerError::invalid_target("cannot grant a role to the null account"));
        }
        if self.roles.holds(cmd.role, cmd.account) {
            return Ok(vec![]);
        }

        Ok(vec![TokenEvent::RoleGranted(RoleChanged {
            ledger_id: self.id,
            actor: cmd.caller,
            role: cmd.role,
            account: cmd.account,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        self.roles.require(Role::Admin, cmd.caller)?;
        if !self.roles.holds(cmd.role, cmd.account) {
            return Ok(vec![]);
        }
        self.ensure_not_last_admin(cmd.role)?;

        Ok(vec![TokenEvent::RoleRevoked(RoleChanged {
            ledger_id: self.id,
            actor: cmd.caller,
            role: cmd.role,
            account: cmd.account,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_renounce_role(&self, cmd: &RenounceRole) -> LedgerResult<Vec<TokenEvent>> {
        self.ensure_initialized()?;
        if !self.roles.holds(cmd.role, cmd.caller) {
            return Ok(vec![]);
        }
        self.ensure_not_last_admin(cmd.role)?;

        Ok(vec![TokenEvent::RoleRevoked(RoleChanged {
            ledger_id: self.id,
            actor: cmd.caller,
            role: cmd.role,
            account: cmd.caller,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Removing the last ADMIN would make role administration impossible.
    fn ensure_not_last_admin(&self, role: Role) -> LedgerResult<()> {
        if role == Role::Admin && self.roles.admin_count() <= 1 {
            return Err(LedgerError::invalid_input(
                "cannot remove the last administrator",
            ));
        }
        Ok(())
    }
}
