use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use netfab_core::{Aggregate, ItemId, MovementId, UserId};
use netfab_infra::services::{CatalogService, LedgerService, MovementRequest, NewItem};
use netfab_infra::store::{InMemoryStore, Store};
use netfab_inventory::{
    InventoryCommand, InventoryEvent, InventoryItem, ItemCategory, ItemDetails, MovementEntry,
    MovementReason, MovementType, RecordMovement, RegisterItem, reconcile,
};

fn details() -> ItemDetails {
    ItemDetails {
        code: "PN-BENCH".to_string(),
        name: "bench panel".to_string(),
        category: ItemCategory::Panel,
        unit: "m2".to_string(),
        unit_cost: Decimal::ONE,
    }
}

fn registered_item(initial: i64) -> InventoryItem {
    let item_id = ItemId::new();
    let mut item = InventoryItem::empty(item_id);
    item.execute(&InventoryCommand::RegisterItem(RegisterItem {
        item_id,
        details: details(),
        initial_quantity: Decimal::from(initial),
        opening_movement_id: MovementId::new(),
        actor: UserId::new(),
        occurred_at: Utc::now(),
    }))
    .expect("register");
    item
}

fn movement(item_id: ItemId, movement_type: MovementType, quantity: i64) -> InventoryCommand {
    InventoryCommand::RecordMovement(RecordMovement {
        movement_id: MovementId::new(),
        item_id,
        movement_type,
        quantity: Decimal::from(quantity),
        related_order_id: None,
        actor: UserId::new(),
        reason: MovementReason::Manual,
        notes: None,
        occurred_at: Utc::now(),
    })
}

/// Decide + apply of one movement against the aggregate, no storage.
fn bench_movement_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement_decision");

    for movement_type in MovementType::ALL {
        group.bench_function(movement_type.as_str(), |b| {
            let item = registered_item(1_000_000);
            let command = movement(item.id_typed(), movement_type, 3);
            b.iter(|| {
                let mut item = item.clone();
                let events = item.execute(black_box(&command)).expect("movement");
                black_box(events);
            });
        });
    }

    group.finish();
}

/// Reconciliation cost grows with ledger length.
fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for len in [10usize, 100, 1000] {
        let mut item = registered_item(0);
        let mut ledger: Vec<MovementEntry> = Vec::with_capacity(len);
        for i in 0..len {
            let movement_type = if i % 3 == 2 { MovementType::Salida } else { MovementType::Entrada };
            let events = item
                .execute(&movement(item.id_typed(), movement_type, 1))
                .expect("movement");
            ledger.extend(events.into_iter().filter_map(|e| match e {
                InventoryEvent::MovementRecorded(entry) => Some(entry),
                _ => None,
            }));
        }

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &ledger, |b, ledger| {
            b.iter(|| black_box(reconcile(&item, ledger)));
        });
    }

    group.finish();
}

/// Full unit of work through the service over the in-memory store.
fn bench_record_movement_service(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let catalog = CatalogService::new(store.clone());
    let ledger = LedgerService::new(store);
    let actor = UserId::new();

    let item = runtime
        .block_on(catalog.register_item(
            NewItem {
                code: "PN-SVC".to_string(),
                name: "service bench panel".to_string(),
                category: ItemCategory::Panel,
                unit: "m2".to_string(),
                unit_cost: Decimal::ONE,
                initial_quantity: Decimal::ZERO,
            },
            actor,
        ))
        .expect("register");
    let item_id = item.id_typed();

    let mut group = c.benchmark_group("record_movement_service");
    group.throughput(Throughput::Elements(1));
    group.bench_function("entrada", |b| {
        b.iter(|| {
            let entry = runtime
                .block_on(ledger.record_movement(
                    MovementRequest {
                        item_id,
                        movement_type: MovementType::Entrada,
                        quantity: Decimal::ONE,
                        related_order_id: None,
                        notes: None,
                    },
                    actor,
                ))
                .expect("movement");
            black_box(entry);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_movement_decision,
    bench_reconciliation,
    bench_record_movement_service
);
criterion_main!(benches);
