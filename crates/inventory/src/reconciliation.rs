//! Ledger vs. quantity-on-hand check.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{ItemId, MovementId};

use crate::item::InventoryItem;
use crate::movement::MovementEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub item_id: ItemId,
    pub quantity_on_hand: Decimal,
    /// Sum of every entry's signed delta.
    pub ledger_total: Decimal,
    pub entries: usize,
    /// Entries whose `quantity_before` differs from the previous entry's
    /// `quantity_after`.
    pub chain_breaks: Vec<MovementId>,
    pub balanced: bool,
}

/// Compare an item against its full ledger, oldest entry first.
///
/// Entries belonging to other items are ignored.
pub fn reconcile(item: &InventoryItem, ledger: &[MovementEntry]) -> ReconciliationReport {
    let item_id = item.id_typed();
    let mut ledger_total = Decimal::ZERO;
    let mut entries = 0;
    let mut chain_breaks = Vec::new();
    let mut previous_after = Decimal::ZERO;

    for entry in ledger.iter().filter(|e| e.item_id == item_id) {
        if entry.quantity_before.value() != previous_after {
            chain_breaks.push(entry.id);
        }
        ledger_total += entry.delta();
        previous_after = entry.quantity_after.value();
        entries += 1;
    }

    let quantity_on_hand = item.quantity_on_hand().value();
    ReconciliationReport {
        item_id,
        quantity_on_hand,
        ledger_total,
        entries,
        balanced: chain_breaks.is_empty() && ledger_total == quantity_on_hand,
        chain_breaks,
    }
}
