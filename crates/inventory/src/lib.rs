//! Item catalog and movement ledger.
//!
//! Pure domain logic: the `InventoryItem` aggregate decides every quantity
//! change and emits the ledger row that explains it. No IO, no storage.

pub mod item;
pub mod movement;
pub mod reconciliation;

pub use item::{
    InventoryCommand, InventoryEvent, InventoryItem, ItemCategory, ItemDetails, ItemDetailsUpdated,
    ItemRegistered, ItemRetired, RecordMovement, RegisterItem, RetireItem, UpdateItemDetails,
};
pub use movement::{MovementEntry, MovementReason, MovementType};
pub use reconciliation::{ReconciliationReport, reconcile};
