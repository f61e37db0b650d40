//! Persistence boundary: a read side plus transactional units of work.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{
    ItemFilter, MovementFilter, MovementStats, MovementTypeStats, OrderFilter, OrderStats, Page,
    Pagination, StateCount,
};
pub use r#trait::{Store, StoreError, UnitOfWork};
