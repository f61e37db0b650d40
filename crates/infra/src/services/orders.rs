use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use netfab_core::{
    Aggregate, AggregateRoot, DomainError, ExpectedVersion, ItemId, LineId, MovementId, OrderId,
    Quantity, UserId,
};
use netfab_inventory::{InventoryItem, MovementReason, MovementType, RecordMovement};
use netfab_production::{
    CreateOrder, LineDraft, LineItemType, OrderCommand, OrderNumber, OrderState, Priority,
    ProductionOrder, TransitionState, UpdateOrderDetails,
};

use super::ledger::record_in;
use super::restorer::restore_lines;
use super::{CommandError, finish, trace_events};
use crate::store::{OrderFilter, OrderStats, Page, Pagination, Store, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub item_id: ItemId,
    /// Defaults to the type matching the item's category.
    pub item_type: Option<LineItemType>,
    pub quantity: Decimal,
    /// Defaults to the item's catalog cost.
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub client: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub lines: Vec<NewLine>,
}

/// Header fields of a pending order; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderChanges {
    pub client: Option<String>,
    pub priority: Option<Priority>,
    /// `Some("")` clears the notes.
    pub notes: Option<String>,
}

/// One line of a stock check, shaped like an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub item_id: ItemId,
    pub item_type: Option<LineItemType>,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAvailability {
    pub line_no: u32,
    pub item_id: ItemId,
    pub item_type: Option<LineItemType>,
    pub requested: Decimal,
    /// On hand minus what earlier lines of the same check already claim.
    pub available: Decimal,
    pub available_for_order: bool,
    /// Why the line could not be ordered as is.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub lines: Vec<LineAvailability>,
    pub all_available: bool,
}

/// Production order lifecycle, including stock reservation on creation and
/// restoration on cancellation.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, new_order), fields(client = %new_order.client, lines = new_order.lines.len(), actor = %actor))]
    pub async fn create_order(&self, new_order: NewOrder, actor: UserId) -> Result<ProductionOrder, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = create_in(uow.as_mut(), new_order, actor, Utc::now()).await;
        let order = finish(uow, result).await?;

        info!(
            order_id = %order.id(),
            order_number = ?order.order_number().map(ToString::to_string),
            total_cost = %order.total_cost(),
            "order created"
        );
        Ok(order)
    }

    #[instrument(skip(self, comment), fields(order_id = %order_id, to = %to, actor = %actor))]
    pub async fn transition_state(
        &self,
        order_id: OrderId,
        to: OrderState,
        comment: Option<String>,
        actor: UserId,
    ) -> Result<ProductionOrder, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = transition_in(uow.as_mut(), order_id, to, comment, actor, Utc::now()).await;
        let order = finish(uow, result).await?;

        info!(state = %order.state(), "order state changed");
        Ok(order)
    }

    /// Edit client, priority or notes of a pending order.
    #[instrument(skip(self, changes), fields(order_id = %order_id, actor = %actor))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        changes: OrderChanges,
        actor: UserId,
    ) -> Result<ProductionOrder, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = update_in(uow.as_mut(), order_id, changes, actor, Utc::now()).await;
        let order = finish(uow, result).await?;

        info!(version = order.version(), "order details updated");
        Ok(order)
    }

    /// Answer whether `lines` could be ordered right now. Reads only; nothing
    /// is reserved, so a later `create_order` may still find less stock.
    pub async fn check_availability(&self, lines: &[StockCheck]) -> Result<AvailabilityReport, CommandError> {
        if lines.is_empty() {
            return Err(DomainError::validation("a stock check needs at least one line").into());
        }

        let mut claimed: HashMap<ItemId, Decimal> = HashMap::new();
        let mut report = Vec::with_capacity(lines.len());
        for (line, line_no) in lines.iter().zip(1u32..) {
            let requested = Quantity::positive(line.quantity).map_err(|e| match e {
                DomainError::Validation(msg) => DomainError::validation(format!("line {line_no}: {msg}")),
                other => other,
            })?;
            let item = self
                .store
                .get_item(line.item_id)
                .await?
                .filter(InventoryItem::is_active);

            let (available, reason) = match item {
                None => (Decimal::ZERO, Some("item does not exist or is retired".to_string())),
                Some(item) => {
                    let category = item.category();
                    let item_type = line.item_type.unwrap_or_else(|| LineItemType::for_category(category));
                    let already = claimed.get(&line.item_id).copied().unwrap_or(Decimal::ZERO);
                    let available = (item.quantity_on_hand().value() - already).max(Decimal::ZERO);
                    if !item_type.matches(category) {
                        (available, Some(format!("item is a {category} item, not {item_type}")))
                    } else if !item_type.reserves_stock() {
                        (available, None)
                    } else if requested.value() > available {
                        (available, Some(format!("only {available} available")))
                    } else {
                        claimed.insert(line.item_id, already + requested.value());
                        (available, None)
                    }
                }
            };

            report.push(LineAvailability {
                line_no,
                item_id: line.item_id,
                item_type: line.item_type,
                requested: requested.value(),
                available,
                available_for_order: reason.is_none(),
                reason,
            });
        }

        let all_available = report.iter().all(|l| l.available_for_order);
        Ok(AvailabilityReport {
            lines: report,
            all_available,
        })
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<ProductionOrder, CommandError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("order {order_id}")).into())
    }

    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        pagination: Pagination,
    ) -> Result<Page<ProductionOrder>, CommandError> {
        Ok(self.store.list_orders(filter, pagination).await?)
    }

    pub async fn order_stats(&self) -> Result<OrderStats, CommandError> {
        Ok(self.store.order_stats().await?)
    }
}

async fn create_in(
    uow: &mut dyn UnitOfWork,
    new_order: NewOrder,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<ProductionOrder, CommandError> {
    // Lock in id order so concurrent orders over the same items cannot deadlock.
    let mut item_ids: Vec<ItemId> = new_order.lines.iter().map(|l| l.item_id).collect();
    item_ids.sort();
    item_ids.dedup();

    let mut items: HashMap<ItemId, InventoryItem> = HashMap::with_capacity(item_ids.len());
    for item_id in item_ids {
        if let Some(item) = uow.lock_item(item_id).await?.filter(InventoryItem::is_active) {
            items.insert(item_id, item);
        }
    }

    let mut drafts = Vec::with_capacity(new_order.lines.len());
    for (idx, line) in new_order.lines.iter().enumerate() {
        let item = items.get(&line.item_id).ok_or_else(|| {
            DomainError::validation(format!(
                "line {}: item {} does not exist or is retired",
                idx + 1,
                line.item_id
            ))
        })?;
        let details = item.details();
        let item_type = line
            .item_type
            .unwrap_or_else(|| LineItemType::for_category(details.category));
        if !item_type.matches(details.category) {
            return Err(DomainError::validation(format!(
                "line {}: item {} is a {} item, not {}",
                idx + 1,
                details.code,
                details.category,
                item_type
            ))
            .into());
        }
        drafts.push(LineDraft {
            line_id: LineId::new(),
            item_id: line.item_id,
            item_type,
            quantity: line.quantity,
            unit: details.unit.clone(),
            unit_cost: line.unit_cost.unwrap_or(details.unit_cost),
            notes: line.notes.clone(),
        });
    }

    let today = now.date_naive();
    let last = uow.last_order_number(today).await?;
    let order_number = OrderNumber::next(today, last.as_ref());

    let order_id = OrderId::new();
    let mut order = ProductionOrder::empty(order_id);
    let events = order.execute(&OrderCommand::CreateOrder(CreateOrder {
        order_id,
        order_number: order_number.clone(),
        client: new_order.client,
        priority: new_order.priority,
        notes: new_order.notes,
        lines: drafts,
        actor,
        occurred_at: now,
    }))?;
    // The order row must exist before ledger rows can reference it.
    trace_events(&events);
    uow.persist_order(&order, &events, ExpectedVersion::New).await?;

    for line in order.lines().iter().filter(|l| l.item_type.reserves_stock()) {
        record_in(
            uow,
            RecordMovement {
                movement_id: MovementId::new(),
                item_id: line.item_id,
                movement_type: MovementType::Salida,
                quantity: line.quantity_committed.value(),
                related_order_id: Some(order_id),
                actor,
                reason: MovementReason::OrderReservation,
                notes: Some(format!("reserved for order {order_number}, line {}", line.line_no)),
                occurred_at: now,
            },
        )
        .await?;
    }

    Ok(order)
}

async fn update_in(
    uow: &mut dyn UnitOfWork,
    order_id: OrderId,
    changes: OrderChanges,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<ProductionOrder, CommandError> {
    let mut order = uow
        .lock_order(order_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
    let expected = ExpectedVersion::Exact(order.version());
    let events = order.execute(&OrderCommand::UpdateOrderDetails(UpdateOrderDetails {
        order_id,
        client: changes.client,
        priority: changes.priority,
        notes: changes.notes,
        actor,
        occurred_at: now,
    }))?;
    trace_events(&events);
    uow.persist_order(&order, &events, expected).await?;
    Ok(order)
}

async fn transition_in(
    uow: &mut dyn UnitOfWork,
    order_id: OrderId,
    to: OrderState,
    comment: Option<String>,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<ProductionOrder, CommandError> {
    let mut order = uow
        .lock_order(order_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;

    if to == OrderState::Cancelada && order.state() != OrderState::Cancelada {
        if !order.state().can_transition_to(to) {
            return Err(DomainError::invalid_transition(order.state(), to).into());
        }
        restore_lines(uow, &mut order, actor, now).await?;
    }

    let expected = ExpectedVersion::Exact(order.version());
    let events = order.execute(&OrderCommand::TransitionState(TransitionState {
        order_id,
        to,
        comment,
        actor,
        occurred_at: now,
    }))?;
    trace_events(&events);
    uow.persist_order(&order, &events, expected).await?;
    Ok(order)
}
