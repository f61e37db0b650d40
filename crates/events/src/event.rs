use chrono::{DateTime, Utc};

/// A fact produced by an aggregate.
///
/// Events are never edited after they are emitted: the store turns them into
/// insert-only rows (ledger entries, history entries) or into state updates
/// derived from them.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name (e.g. "inventory.movement.recorded"), used in logs.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}
