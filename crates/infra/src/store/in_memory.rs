use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use netfab_core::{AggregateRoot, ExpectedVersion, ItemId, MovementId, OrderId};
use netfab_inventory::{InventoryEvent, InventoryItem, MovementEntry, MovementType};
use netfab_production::{OrderEvent, OrderNumber, ProductionOrder};

use super::query::{ItemFilter, MovementFilter, MovementStats, OrderFilter, OrderStats, Page, Pagination};
use super::r#trait::{Store, StoreError, UnitOfWork};

#[derive(Debug, Default, Clone)]
struct State {
    items: HashMap<ItemId, InventoryItem>,
    /// Insertion order is ledger order.
    movements: Vec<MovementEntry>,
    orders: HashMap<OrderId, ProductionOrder>,
}

/// In-memory store.
///
/// A unit of work holds the single store-wide lock and edits a private copy
/// of the state, which replaces the shared one on commit. Intended for tests
/// and local runs.
///
/// Reads take the same lock, so they wait until an open unit of work commits
/// or is dropped, and never see its uncommitted writes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<InventoryItem> = state
            .items
            .values()
            .filter(|i| filter.include_retired || i.is_active())
            .filter(|i| filter.category.is_none_or(|c| i.category() == c))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.details().code.cmp(&b.details().code));
        Ok(items)
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<Page<MovementEntry>, StoreError> {
        let state = self.state.lock().await;
        let matching: Vec<MovementEntry> = state
            .movements
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        Ok(pagination.slice(&matching))
    }

    async fn get_movement(&self, movement_id: MovementId) -> Result<Option<MovementEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.movements.iter().find(|e| e.id == movement_id).cloned())
    }

    async fn movement_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MovementStats, StoreError> {
        let state = self.state.lock().await;
        let filter = MovementFilter {
            from,
            to,
            ..MovementFilter::default()
        };
        Ok(MovementStats::from_entries(
            state.movements.iter().filter(|e| filter.matches(e)),
        ))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<ProductionOrder>, StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<ProductionOrder> = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.order_number().cmp(&a.order_number()))
        });
        Ok(pagination.slice(&matching))
    }

    async fn order_stats(&self) -> Result<OrderStats, StoreError> {
        let state = self.state.lock().await;
        Ok(OrderStats::from_states(state.orders.values().map(|o| o.state())))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn check_version(
    what: &str,
    expected: ExpectedVersion,
    stored: Option<u64>,
) -> Result<(), StoreError> {
    if expected.matches(stored) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{what}: expected {expected:?}, found {stored:?}"
        )))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.working.items.get(&item_id).cloned())
    }

    async fn item_code_taken(&mut self, code: &str) -> Result<bool, StoreError> {
        Ok(self.working.items.values().any(|i| i.details().code == code))
    }

    async fn item_ledger(&mut self, item_id: ItemId) -> Result<Vec<MovementEntry>, StoreError> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn restored_quantity(
        &mut self,
        order_id: OrderId,
        item_id: ItemId,
    ) -> Result<Decimal, StoreError> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|e| e.is_restoration_for(order_id, item_id) && e.movement_type == MovementType::Entrada)
            .map(|e| e.quantity.value())
            .sum())
    }

    async fn persist_item(
        &mut self,
        item: &InventoryItem,
        events: &[InventoryEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let stored = self.working.items.get(item.id()).map(|i| i.version());
        check_version("item", expected, stored)?;

        for event in events {
            if let InventoryEvent::MovementRecorded(entry) = event {
                if let Some(order_id) = entry.related_order_id {
                    if !self.working.orders.contains_key(&order_id) {
                        return Err(StoreError::Backend(format!("unknown related order {order_id}")));
                    }
                }
                self.working.movements.push(entry.clone());
            }
        }
        self.working.items.insert(*item.id(), item.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, StoreError> {
        Ok(self.working.orders.contains_key(&order_id))
    }

    async fn last_order_number(&mut self, date: NaiveDate) -> Result<Option<OrderNumber>, StoreError> {
        Ok(self
            .working
            .orders
            .values()
            .filter_map(|o| o.order_number())
            .filter(|n| n.date() == date)
            .max()
            .cloned())
    }

    async fn persist_order(
        &mut self,
        order: &ProductionOrder,
        events: &[OrderEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let stored = self.working.orders.get(order.id()).map(|o| o.version());
        check_version("order", expected, stored)?;

        if expected == ExpectedVersion::New {
            let number = order.order_number();
            if self.working.orders.values().any(|o| o.order_number() == number) {
                return Err(StoreError::Concurrency(format!(
                    "order number {number:?} already issued"
                )));
            }
        }
        self.working.orders.insert(*order.id(), order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netfab_core::{Aggregate, UserId};
    use netfab_inventory::{InventoryCommand, ItemDetails, RegisterItem};

    async fn register(uow: &mut dyn UnitOfWork, initial: i64) -> InventoryItem {
        let id = ItemId::new();
        let mut item = InventoryItem::empty(id);
        let events = item
            .execute(&InventoryCommand::RegisterItem(RegisterItem {
                item_id: id,
                details: ItemDetails {
                    code: format!("IT-{id}"),
                    name: "Hilo".into(),
                    ..ItemDetails::default()
                },
                initial_quantity: Decimal::from(initial),
                opening_movement_id: MovementId::new(),
                actor: UserId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        uow.persist_item(&item, &events, ExpectedVersion::New).await.unwrap();
        item
    }

    #[tokio::test]
    async fn commit_publishes_working_copy() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let item = register(uow.as_mut(), 4).await;
        uow.commit().await.unwrap();

        let stored = store.get_item(*item.id()).await.unwrap().unwrap();
        assert_eq!(stored.quantity_on_hand().value(), Decimal::from(4));
        let page = store
            .list_movements(&MovementFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_discards_writes() {
        let store = InMemoryStore::new();
        let item_id = {
            let mut uow = store.begin().await.unwrap();
            *register(uow.as_mut(), 4).await.id()
        };
        assert!(store.get_item(item_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_wait_for_an_open_unit_of_work() {
        use std::time::Duration;

        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let item = register(uow.as_mut(), 2).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.get_item(*item.id())).await;
        assert!(blocked.is_err());

        uow.commit().await.unwrap();
        assert!(store.get_item(*item.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_version_is_a_concurrency_error() {
        let store = InMemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let item = register(uow.as_mut(), 0).await;
        let err = uow
            .persist_item(
                &item,
                &[InventoryEvent::ItemRetired(netfab_inventory::ItemRetired {
                    item_id: *item.id(),
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                })],
                ExpectedVersion::New,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }
}
