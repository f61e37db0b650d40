//! `netfab-core`: domain building blocks shared by the catalog, the movement
//! ledger and production orders.
//!
//! Pure domain code only; no IO, no storage, no HTTP.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, RestorationFailure};
pub use id::{ItemId, LineId, MovementId, OrderId, UserId};
pub use value_object::{MAX_SCALE, Quantity, ValueObject, ensure_scale};

pub use rust_decimal::Decimal;
