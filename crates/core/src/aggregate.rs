//! Aggregate traits shared by the catalog item and the production order.

use crate::error::{DomainError, DomainResult};

/// Identity + version of a consistency boundary.
///
/// Every mutation of an item or an order goes through exactly one aggregate
/// instance inside one unit of work, so the version is what the store checks
/// when it writes the row back.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied since the aggregate was first registered.
    fn version(&self) -> u64;
}

/// Version the caller expects the persisted row to be at when writing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The row must not exist yet.
    New,
    /// The row must still be at this exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::New, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "stale write (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

/// Decide/evolve split used by every aggregate.
///
/// `handle` validates a command against the current state and returns the
/// events that would follow from it; it never mutates. `apply` folds one
/// event into the state. The application layer persists the events and the
/// resulting state together, or neither.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Must bump `version()` by one per event.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Handle a command and immediately fold the resulting events.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}
