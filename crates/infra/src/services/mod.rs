//! Application services: each public operation runs in exactly one unit of
//! work and either commits everything it wrote or nothing.

use thiserror::Error;
use tracing::{debug, warn};

use netfab_core::DomainError;
use netfab_events::Event;

use crate::store::{StoreError, UnitOfWork};

pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod restorer;

pub use catalog::{CatalogService, ItemChanges, NewItem, StockAlerts, ToolInUse};
pub use ledger::{LedgerService, MovementRequest};
pub use orders::{
    AvailabilityReport, LineAvailability, NewLine, NewOrder, OrderChanges, OrderService, StockCheck,
};
pub use restorer::{CancellationRestorer, RestorationOutcome};

#[derive(Debug, Error)]
pub enum CommandError {
    /// Deterministic business failure; retrying the same call fails again.
    #[error(transparent)]
    Domain(DomainError),

    /// Row lock, version or serialization conflict.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error(transparent)]
    Store(StoreError),
}

impl CommandError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::Concurrency(_))
    }
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => CommandError::Concurrency(msg),
            other => CommandError::Domain(other),
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => CommandError::Concurrency(msg),
            other => CommandError::Store(other),
        }
    }
}

/// Commit on success, roll back on failure.
pub(crate) async fn finish<T>(
    uow: Box<dyn UnitOfWork>,
    result: Result<T, CommandError>,
) -> Result<T, CommandError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            warn!(error = %err, retryable = err.is_retryable(), "operation rejected, rolling back");
            if let Err(rollback) = uow.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

pub(crate) fn trace_events<E: Event>(events: &[E]) {
    for event in events {
        debug!(
            event_type = event.event_type(),
            schema_version = event.version(),
            occurred_at = %event.occurred_at(),
            "event applied"
        );
    }
}
