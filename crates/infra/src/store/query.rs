//! Filters, pagination and aggregate figures for the read side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{ItemId, OrderId};
use netfab_inventory::{ItemCategory, MovementEntry, MovementType};
use netfab_production::{OrderState, Priority, ProductionOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Cut one page out of an already filtered and ordered list.
    pub fn slice<T: Clone>(&self, all: &[T]) -> Page<T> {
        let total = all.len() as u64;
        let items: Vec<T> = all
            .iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .cloned()
            .collect();
        Page::new(items, total, *self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (items.len() as u64) < total;
        Self {
            items,
            total,
            pagination,
            has_more,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub category: Option<ItemCategory>,
    pub include_retired: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub movement_type: Option<MovementType>,
    pub item_id: Option<ItemId>,
    pub order_id: Option<OrderId>,
    /// Inclusive.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive.
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn matches(&self, entry: &MovementEntry) -> bool {
        self.movement_type.is_none_or(|t| entry.movement_type == t)
            && self.item_id.is_none_or(|id| entry.item_id == id)
            && self.order_id.is_none_or(|id| entry.related_order_id == Some(id))
            && self.from.is_none_or(|from| entry.recorded_at >= from)
            && self.to.is_none_or(|to| entry.recorded_at <= to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub state: Option<OrderState>,
    pub priority: Option<Priority>,
    /// Case-insensitive substring of the client name.
    pub client: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &ProductionOrder) -> bool {
        self.state.is_none_or(|s| order.state() == s)
            && self.priority.is_none_or(|p| order.priority() == p)
            && self.client.as_deref().is_none_or(|needle| {
                order.client().to_lowercase().contains(&needle.to_lowercase())
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementTypeStats {
    pub movement_type: MovementType,
    pub count: u64,
    /// Sum of the requested quantities (targets, for AJUSTE).
    pub total_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementStats {
    /// Always one row per movement type, zeroes included.
    pub by_type: Vec<MovementTypeStats>,
    pub total: u64,
}

impl MovementStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a MovementEntry>) -> Self {
        let mut by_type: Vec<MovementTypeStats> = MovementType::ALL
            .into_iter()
            .map(|movement_type| MovementTypeStats {
                movement_type,
                count: 0,
                total_quantity: Decimal::ZERO,
            })
            .collect();
        let mut total = 0;
        for entry in entries {
            if let Some(row) = by_type.iter_mut().find(|r| r.movement_type == entry.movement_type) {
                row.count += 1;
                row.total_quantity += entry.quantity.value();
            }
            total += 1;
        }
        Self { by_type, total }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: OrderState,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    /// Always one row per state, zeroes included.
    pub by_state: Vec<StateCount>,
    pub total: u64,
}

impl OrderStats {
    pub fn from_states(states: impl IntoIterator<Item = OrderState>) -> Self {
        let mut by_state: Vec<StateCount> = OrderState::ALL
            .into_iter()
            .map(|state| StateCount { state, count: 0 })
            .collect();
        let mut total = 0;
        for state in states {
            if let Some(row) = by_state.iter_mut().find(|r| r.state == state) {
                row.count += 1;
            }
            total += 1;
        }
        Self { by_state, total }
    }
}
