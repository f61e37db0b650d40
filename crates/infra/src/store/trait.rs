use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use netfab_core::{ExpectedVersion, ItemId, MovementId, OrderId};
use netfab_inventory::{InventoryEvent, InventoryItem, MovementEntry};
use netfab_production::{OrderEvent, OrderNumber, ProductionOrder};

use super::query::{ItemFilter, MovementFilter, MovementStats, OrderFilter, OrderStats, Page, Pagination};

/// Storage failure.
///
/// These are infrastructure errors, as opposed to domain errors (validation,
/// stock, transitions).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Version mismatch, lock timeout, serialization failure or deadlock.
    /// Retrying the whole operation may succeed.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Entry point to the persisted state.
///
/// Every mutating operation runs inside exactly one [`UnitOfWork`]; the
/// read-side methods here serve listings and lookups that need no locks.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Active or retired; the caller decides what a retired item means.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    /// Ordered by item code.
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StoreError>;

    /// Newest first.
    async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<Page<MovementEntry>, StoreError>;

    async fn get_movement(&self, movement_id: MovementId) -> Result<Option<MovementEntry>, StoreError>;

    async fn movement_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MovementStats, StoreError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError>;

    /// Newest first.
    async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<ProductionOrder>, StoreError>;

    async fn order_stats(&self) -> Result<OrderStats, StoreError>;
}

/// One transaction over items, the ledger and orders.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] discards
/// everything written through it.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Load an item and hold its row lock until the unit of work ends.
    async fn lock_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    async fn item_code_taken(&mut self, code: &str) -> Result<bool, StoreError>;

    /// Full ledger of one item, oldest entry first.
    async fn item_ledger(&mut self, item_id: ItemId) -> Result<Vec<MovementEntry>, StoreError>;

    /// Sum of cancellation-restoration ENTRADA quantities already booked for
    /// this order and item.
    async fn restored_quantity(&mut self, order_id: OrderId, item_id: ItemId)
    -> Result<Decimal, StoreError>;

    /// Write the item row and the rows its events imply (ledger entries).
    ///
    /// `expected` is the version the item had when it was loaded.
    async fn persist_item(
        &mut self,
        item: &InventoryItem,
        events: &[InventoryEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Load an order and hold its row lock until the unit of work ends.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<ProductionOrder>, StoreError>;

    async fn order_exists(&mut self, order_id: OrderId) -> Result<bool, StoreError>;

    /// Highest order number issued on `date`. Serializes numbering for that
    /// day until the unit of work ends.
    async fn last_order_number(&mut self, date: NaiveDate) -> Result<Option<OrderNumber>, StoreError>;

    /// Write the order row and the rows its events imply (lines, history).
    async fn persist_order(
        &mut self,
        order: &ProductionOrder,
        events: &[OrderEvent],
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
