use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;

use tally_auth::Role;
use tally_events::{EventEnvelope, InMemoryEventBus};
use tally_infra::event_store::InMemoryEventStore;
use tally_infra::projections::BalancesProjection;
use tally_infra::{LedgerConfig, TokenService};

fn main() -> anyhow::Result<()> {
    tally_observability::init();

    let config = LedgerConfig::from_env().context("failed to load ledger configuration")?;

    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
    let subscription = tally_events::EventBus::subscribe(&bus);

    let service = TokenService::bootstrap(&config, store, bus)
        .with_context(|| format!("failed to bootstrap ledger {}", config.ledger_id))?;

    let projection = BalancesProjection::new();
    projection
        .catch_up(&subscription)
        .context("failed to project bootstrap events")?;
    projection
        .audit(config.ledger_id)
        .context("projected balances disagree with total supply")?;
    service.verify().context("ledger supply identity violated")?;

    let roles: Vec<&str> = Role::ALL
        .into_iter()
        .filter(|role| service.has_role(*role, config.admin))
        .map(|role| role.as_str())
        .collect();

    tracing::info!(
        ledger_id = %config.ledger_id,
        name = %service.name().unwrap_or_default(),
        symbol = %service.symbol().unwrap_or_default(),
        decimals = service.decimals(),
        total_supply = %service.total_supply(),
        "ledger ready"
    );
    tracing::info!(
        admin = %config.admin,
        balance = %service.balance_of(config.admin),
        roles = ?roles,
        "administrator"
    );

    Ok(())
}
