use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use netfab_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, ItemId, MovementId, UserId};
use netfab_inventory::{
    InventoryCommand, InventoryItem, ItemCategory, ItemDetails, RegisterItem, RetireItem,
    UpdateItemDetails,
};
use netfab_production::{LineItemType, OrderState};

use super::{CommandError, finish, trace_events};
use crate::store::{ItemFilter, OrderFilter, Pagination, Store, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub code: String,
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    pub unit_cost: Decimal,
    pub initial_quantity: Decimal,
}

/// Editable catalog fields; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub unit_cost: Option<Decimal>,
}

/// An active tool named on a detail line of an order in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInUse {
    pub item: InventoryItem,
    pub order_numbers: Vec<String>,
}

/// Items that need attention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockAlerts {
    pub threshold: Decimal,
    /// Panels and materials with nothing on hand.
    pub out_of_stock: Vec<InventoryItem>,
    /// Panels and materials at or below the threshold but not empty.
    pub low_stock: Vec<InventoryItem>,
    pub tools_in_use: Vec<ToolInUse>,
}

impl StockAlerts {
    pub fn total(&self) -> usize {
        self.out_of_stock.len() + self.low_stock.len() + self.tools_in_use.len()
    }
}

/// Item catalog: registration, lookup, edits, retirement, alerts.
///
/// Quantities are never edited here; see [`super::LedgerService`].
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, new_item), fields(code = %new_item.code, actor = %actor))]
    pub async fn register_item(&self, new_item: NewItem, actor: UserId) -> Result<InventoryItem, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = register_in(uow.as_mut(), new_item, actor).await;
        let item = finish(uow, result).await?;

        info!(
            item_id = %item.id(),
            quantity_on_hand = %item.quantity_on_hand(),
            "item registered"
        );
        Ok(item)
    }

    /// Active items only.
    pub async fn get_item(&self, item_id: ItemId) -> Result<InventoryItem, CommandError> {
        self.store
            .get_item(item_id)
            .await?
            .filter(InventoryItem::is_active)
            .ok_or_else(|| DomainError::not_found(format!("item {item_id}")).into())
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, CommandError> {
        Ok(self.store.list_items(filter).await?)
    }

    /// Change name, unit or default cost. Stock is untouched.
    #[instrument(skip(self, changes), fields(item_id = %item_id, actor = %actor))]
    pub async fn update_item(
        &self,
        item_id: ItemId,
        changes: ItemChanges,
        actor: UserId,
    ) -> Result<InventoryItem, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = update_in(uow.as_mut(), item_id, changes, actor).await;
        let item = finish(uow, result).await?;
        info!(item_id = %item_id, version = item.version(), "item details updated");
        Ok(item)
    }

    /// Hide an item from lookups and new movements. Its ledger stays.
    #[instrument(skip(self), fields(item_id = %item_id, actor = %actor))]
    pub async fn retire_item(&self, item_id: ItemId, actor: UserId) -> Result<InventoryItem, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = retire_in(uow.as_mut(), item_id, actor).await;
        let item = finish(uow, result).await?;
        info!(item_id = %item_id, retired_by = %actor, "item retired");
        Ok(item)
    }

    /// Panels and materials at or below `threshold`, plus tools held by
    /// orders in production.
    pub async fn stock_alerts(&self, threshold: Decimal) -> Result<StockAlerts, CommandError> {
        if threshold.is_sign_negative() && !threshold.is_zero() {
            return Err(DomainError::validation("threshold cannot be negative").into());
        }

        let items = self.store.list_items(&ItemFilter::default()).await?;
        let mut alerts = StockAlerts {
            threshold,
            ..StockAlerts::default()
        };
        for item in items.iter().filter(|i| i.category() != ItemCategory::Tool) {
            let on_hand = item.quantity_on_hand();
            if on_hand.is_zero() {
                alerts.out_of_stock.push(item.clone());
            } else if on_hand.value() <= threshold {
                alerts.low_stock.push(item.clone());
            }
        }

        let running = OrderFilter {
            state: Some(OrderState::EnProceso),
            ..OrderFilter::default()
        };
        let mut pagination = Pagination::new(Some(Pagination::MAX_LIMIT), None);
        loop {
            let page = self.store.list_orders(&running, pagination).await?;
            for order in &page.items {
                let number = order.order_number().map(ToString::to_string).unwrap_or_default();
                for line in order.lines().iter().filter(|l| l.item_type == LineItemType::Herramienta) {
                    match alerts.tools_in_use.iter_mut().find(|t| t.item.id_typed() == line.item_id) {
                        Some(tool) => {
                            if !tool.order_numbers.contains(&number) {
                                tool.order_numbers.push(number.clone());
                            }
                        }
                        None => {
                            if let Some(item) = items.iter().find(|i| i.id_typed() == line.item_id) {
                                alerts.tools_in_use.push(ToolInUse {
                                    item: item.clone(),
                                    order_numbers: vec![number.clone()],
                                });
                            }
                        }
                    }
                }
            }
            if !page.has_more {
                break;
            }
            pagination.offset += pagination.limit;
        }
        alerts
            .tools_in_use
            .sort_by(|a, b| a.item.details().code.cmp(&b.item.details().code));

        Ok(alerts)
    }
}

async fn register_in(
    uow: &mut dyn UnitOfWork,
    new_item: NewItem,
    actor: UserId,
) -> Result<InventoryItem, CommandError> {
    let code = new_item.code.trim().to_string();
    if uow.item_code_taken(&code).await? {
        return Err(DomainError::validation(format!("item code '{code}' is already in use")).into());
    }

    let item_id = ItemId::new();
    let mut item = InventoryItem::empty(item_id);
    let events = item.execute(&InventoryCommand::RegisterItem(RegisterItem {
        item_id,
        details: ItemDetails {
            code,
            name: new_item.name,
            category: new_item.category,
            unit: new_item.unit,
            unit_cost: new_item.unit_cost,
        },
        initial_quantity: new_item.initial_quantity,
        opening_movement_id: MovementId::new(),
        actor,
        occurred_at: Utc::now(),
    }))?;
    trace_events(&events);
    uow.persist_item(&item, &events, ExpectedVersion::New).await?;
    Ok(item)
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    item_id: ItemId,
    changes: ItemChanges,
    actor: UserId,
) -> Result<InventoryItem, CommandError> {
    let mut item = uow
        .lock_item(item_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
    let expected = ExpectedVersion::Exact(item.version());
    let events = item.execute(&InventoryCommand::UpdateItemDetails(UpdateItemDetails {
        item_id,
        name: changes.name,
        unit: changes.unit,
        unit_cost: changes.unit_cost,
        actor,
        occurred_at: Utc::now(),
    }))?;
    trace_events(&events);
    uow.persist_item(&item, &events, expected).await?;
    Ok(item)
}

async fn retire_in(uow: &mut dyn UnitOfWork, item_id: ItemId, actor: UserId) -> Result<InventoryItem, CommandError> {
    let mut item = uow
        .lock_item(item_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
    let expected = ExpectedVersion::Exact(item.version());
    let events = item.execute(&InventoryCommand::RetireItem(RetireItem {
        item_id,
        actor,
        occurred_at: Utc::now(),
    }))?;
    trace_events(&events);
    uow.persist_item(&item, &events, expected).await?;
    Ok(item)
}
