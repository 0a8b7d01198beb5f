use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use serde_json::Value as JsonValue;
use std::sync::Arc;

use tally_core::{AccountId, Amount};
use tally_events::{EventEnvelope, InMemoryEventBus};
use tally_infra::config::LedgerConfig;
use tally_infra::event_store::InMemoryEventStore;
use tally_infra::projections::BalancesProjection;
use tally_infra::token_service::TokenService;

type Service = TokenService<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

fn bootstrapped() -> (Service, LedgerConfig) {
    let config = LedgerConfig::new();
    let service = TokenService::bootstrap(
        &config,
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
    )
    .unwrap();
    (service, config)
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");

    group.bench_function("transfer", |b| {
        let (service, config) = bootstrapped();
        let to = AccountId::new();
        b.iter(|| {
            service
                .transfer(black_box(config.admin), black_box(to), Amount::from_units(1))
                .unwrap();
        });
    });

    group.bench_function("mint", |b| {
        let (service, config) = bootstrapped();
        let to = AccountId::new();
        b.iter(|| {
            service
                .mint(black_box(config.admin), black_box(to), Amount::from_units(1))
                .unwrap();
        });
    });

    group.bench_function("rejected_mint", |b| {
        let (service, _) = bootstrapped();
        let stranger = AccountId::new();
        b.iter(|| {
            let _ = service.mint(black_box(stranger), stranger, Amount::from_units(1));
        });
    });

    group.finish();
}

fn bench_batch_mint(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_mint");

    for size in [1usize, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("targets", size), size, |b, &size| {
            let (service, config) = bootstrapped();
            let targets: Vec<AccountId> = (0..size).map(|_| AccountId::new()).collect();
            let amounts = vec![Amount::from_units(1); size];
            b.iter(|| {
                service
                    .batch_mint(config.admin, targets.clone(), amounts.clone())
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_rehydrate_and_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for event_count in [100usize, 1_000].iter() {
        let (service, config) = bootstrapped();
        let holders: Vec<AccountId> = (0..16).map(|_| AccountId::new()).collect();
        for i in 0..*event_count {
            service
                .transfer(config.admin, holders[i % holders.len()], Amount::from_units(1))
                .unwrap();
        }
        let envelopes = service.replay().unwrap();

        group.throughput(Throughput::Elements(*event_count as u64));
        group.bench_with_input(
            BenchmarkId::new("open_from_store", event_count),
            event_count,
            |b, _| {
                b.iter(|| {
                    TokenService::open(
                        config.ledger_id,
                        service.store().clone(),
                        service.bus().clone(),
                    )
                    .unwrap()
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("projection_rebuild", event_count),
            event_count,
            |b, _| {
                b.iter(|| {
                    let projection = BalancesProjection::new();
                    projection.rebuild_from_scratch(envelopes.clone()).unwrap();
                    black_box(projection.total_supply(config.ledger_id))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_latency,
    bench_batch_mint,
    bench_rehydrate_and_rebuild
);
criterion_main!(benches);
