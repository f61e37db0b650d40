use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use netfab_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion, ItemId, MovementId, OrderId, UserId};
use netfab_inventory::{
    InventoryCommand, InventoryEvent, MovementEntry, MovementReason, MovementType, RecordMovement,
    ReconciliationReport, reconcile,
};

use super::{CommandError, finish, trace_events};
use crate::store::{MovementFilter, MovementStats, Page, Pagination, Store, UnitOfWork};

/// Manual movement as entered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub item_id: ItemId,
    pub movement_type: MovementType,
    /// Moved amount for ENTRADA/SALIDA, new absolute value for AJUSTE.
    pub quantity: Decimal,
    pub related_order_id: Option<OrderId>,
    pub notes: Option<String>,
}

/// The movement ledger: the only way quantities change.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, request),
        fields(item_id = %request.item_id, movement_type = %request.movement_type, actor = %actor)
    )]
    pub async fn record_movement(
        &self,
        request: MovementRequest,
        actor: UserId,
    ) -> Result<MovementEntry, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = record_in(
            uow.as_mut(),
            RecordMovement {
                movement_id: MovementId::new(),
                item_id: request.item_id,
                movement_type: request.movement_type,
                quantity: request.quantity,
                related_order_id: request.related_order_id,
                actor,
                reason: MovementReason::Manual,
                notes: request.notes,
                occurred_at: Utc::now(),
            },
        )
        .await;
        let entry = finish(uow, result).await?;

        info!(
            movement_id = %entry.id,
            quantity_before = %entry.quantity_before,
            quantity_after = %entry.quantity_after,
            "movement recorded"
        );
        Ok(entry)
    }

    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<Page<MovementEntry>, CommandError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(DomainError::validation("`from` must not be after `to`").into());
            }
        }
        Ok(self.store.list_movements(filter, pagination).await?)
    }

    pub async fn get_movement(&self, movement_id: MovementId) -> Result<MovementEntry, CommandError> {
        self.store
            .get_movement(movement_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("movement {movement_id}")).into())
    }

    pub async fn movement_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<MovementStats, CommandError> {
        Ok(self.store.movement_stats(from, to).await?)
    }

    /// Compare an item's quantity on hand with its ledger. Works for retired
    /// items too, since their history is kept.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn reconcile_item(&self, item_id: ItemId) -> Result<ReconciliationReport, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = reconcile_in(uow.as_mut(), item_id).await;
        let report = finish(uow, result).await?;
        if !report.balanced {
            tracing::warn!(
                ledger_total = %report.ledger_total,
                quantity_on_hand = %report.quantity_on_hand,
                chain_breaks = report.chain_breaks.len(),
                "item does not reconcile with its ledger"
            );
        }
        Ok(report)
    }
}

async fn reconcile_in(uow: &mut dyn UnitOfWork, item_id: ItemId) -> Result<ReconciliationReport, CommandError> {
    let item = uow
        .lock_item(item_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
    let ledger = uow.item_ledger(item_id).await?;
    Ok(reconcile(&item, &ledger))
}

/// Lock the item, apply one movement and write the ledger row with the new
/// quantity. Shared by manual movements, order reservations and restorations.
pub(crate) async fn record_in(
    uow: &mut dyn UnitOfWork,
    command: RecordMovement,
) -> Result<MovementEntry, CommandError> {
    if let Some(order_id) = command.related_order_id {
        if !uow.order_exists(order_id).await? {
            return Err(DomainError::not_found(format!("order {order_id}")).into());
        }
    }

    let item_id = command.item_id;
    let mut item = uow
        .lock_item(item_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {item_id}")))?;
    let expected = ExpectedVersion::Exact(item.version());
    let events = item.execute(&InventoryCommand::RecordMovement(command))?;
    trace_events(&events);
    uow.persist_item(&item, &events, expected).await?;

    events
        .into_iter()
        .find_map(|e| match e {
            InventoryEvent::MovementRecorded(entry) => Some(entry),
            _ => None,
        })
        .ok_or_else(|| DomainError::invariant("movement produced no ledger entry").into())
}
