//! Gives reserved stock back when an order is cancelled.
//!
//! Each reserving line (PANO, MATERIAL) is restored at most once: the line's
//! `restored` flag is the primary guard, and the ledger is consulted for
//! restoration entries written before the flag existed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use netfab_core::{
    Aggregate, AggregateRoot, DomainError, ExpectedVersion, MovementId, OrderId, RestorationFailure,
    UserId,
};
use netfab_inventory::{MovementEntry, MovementReason, MovementType, RecordMovement};
use netfab_production::{MarkLineRestored, OrderCommand, OrderLine, OrderState, ProductionOrder};

use super::ledger::record_in;
use super::{CommandError, finish, trace_events};
use crate::store::{Store, UnitOfWork};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationOutcome {
    /// Compensating ENTRADA entries written by this call.
    pub movements: Vec<MovementEntry>,
    /// Lines whose restoration was already in the ledger; only flagged now.
    pub already_in_ledger: Vec<u32>,
}

impl RestorationOutcome {
    pub fn restored_lines(&self) -> usize {
        self.movements.len() + self.already_in_ledger.len()
    }
}

/// Standalone restore for orders that are already `cancelada`.
#[derive(Clone)]
pub struct CancellationRestorer {
    store: Arc<dyn Store>,
}

impl CancellationRestorer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(order_id = %order_id, actor = %actor))]
    pub async fn restore_on_cancellation(
        &self,
        order_id: OrderId,
        actor: UserId,
    ) -> Result<RestorationOutcome, CommandError> {
        let mut uow = self.store.begin().await?;
        let result = restore_cancelled_in(uow.as_mut(), order_id, actor).await;
        let outcome = finish(uow, result).await?;

        info!(restored_lines = outcome.restored_lines(), "restoration finished");
        Ok(outcome)
    }
}

async fn restore_cancelled_in(
    uow: &mut dyn UnitOfWork,
    order_id: OrderId,
    actor: UserId,
) -> Result<RestorationOutcome, CommandError> {
    let mut order = uow
        .lock_order(order_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("order {order_id}")))?;
    if order.state() != OrderState::Cancelada {
        return Err(DomainError::validation(format!(
            "order {order_id} is {}, only cancelled orders can be restored",
            order.state()
        ))
        .into());
    }
    restore_lines(uow, &mut order, actor, Utc::now()).await
}

/// Restore every reserving line of `order` that is not restored yet.
///
/// Runs inside the caller's unit of work. If any line fails the whole call
/// fails with `PartialRestoration`; the caller must roll back.
pub(crate) async fn restore_lines(
    uow: &mut dyn UnitOfWork,
    order: &mut ProductionOrder,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<RestorationOutcome, CommandError> {
    let order_id = order.id_typed();
    let order_number = order.order_number().map(ToString::to_string).unwrap_or_default();
    // Same lock order as order creation: by item id.
    let mut pending: Vec<OrderLine> = order.lines_awaiting_restoration().cloned().collect();
    pending.sort_by_key(|l| (l.item_id, l.line_no));

    let mut outcome = RestorationOutcome::default();
    let mut failed = Vec::new();

    for line in pending {
        if already_in_ledger(uow, order, &line).await? {
            mark_restored(uow, order, line.line_no, now).await?;
            outcome.already_in_ledger.push(line.line_no);
            continue;
        }

        let restored = record_in(
            uow,
            RecordMovement {
                movement_id: MovementId::new(),
                item_id: line.item_id,
                movement_type: MovementType::Entrada,
                quantity: line.quantity_committed.value(),
                related_order_id: Some(order_id),
                actor,
                reason: MovementReason::CancellationRestoration,
                notes: Some(format!("restored from cancelled order {order_number}, line {}", line.line_no)),
                occurred_at: now,
            },
        )
        .await;

        match restored {
            Ok(entry) => {
                mark_restored(uow, order, line.line_no, now).await?;
                outcome.movements.push(entry);
            }
            Err(CommandError::Domain(err)) => failed.push(RestorationFailure {
                line_no: line.line_no,
                item_id: line.item_id,
                reason: err.to_string(),
            }),
            Err(other) => return Err(other),
        }
    }

    if !failed.is_empty() {
        return Err(DomainError::PartialRestoration {
            restored: outcome.restored_lines(),
            failed,
        }
        .into());
    }
    Ok(outcome)
}

/// True when restoration ENTRADAs already booked for this order and item
/// cover this line on top of the lines of the same item already flagged.
async fn already_in_ledger(
    uow: &mut dyn UnitOfWork,
    order: &ProductionOrder,
    line: &OrderLine,
) -> Result<bool, CommandError> {
    let booked = uow.restored_quantity(order.id_typed(), line.item_id).await?;
    let accounted: Decimal = order
        .lines()
        .iter()
        .filter(|l| l.item_id == line.item_id && l.item_type.reserves_stock() && l.restored)
        .map(|l| l.quantity_committed.value())
        .sum();
    Ok(booked - accounted >= line.quantity_committed.value())
}

async fn mark_restored(
    uow: &mut dyn UnitOfWork,
    order: &mut ProductionOrder,
    line_no: u32,
    now: DateTime<Utc>,
) -> Result<(), CommandError> {
    let expected = ExpectedVersion::Exact(order.version());
    let events = order.execute(&OrderCommand::MarkLineRestored(MarkLineRestored {
        order_id: order.id_typed(),
        line_no,
        occurred_at: now,
    }))?;
    trace_events(&events);
    uow.persist_order(order, &events, expected).await?;
    Ok(())
}
