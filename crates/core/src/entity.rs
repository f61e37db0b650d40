//! Entity trait: identity that survives state changes inside an aggregate.

/// Implemented by child records owned by an aggregate (order lines, ledger
/// rows) that need a stable identity of their own.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
