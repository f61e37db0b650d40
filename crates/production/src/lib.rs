//! Production orders: lifecycle state machine and detail lines.
//!
//! Stock reservation and restoration are orchestrated by the application
//! layer; this crate only decides what an order may do next.

pub mod line;
pub mod number;
pub mod order;
pub mod state;

pub use line::{LineDraft, LineItemType, OrderLine};
pub use number::OrderNumber;
pub use order::{
    CreateOrder, LineRestored, MarkLineRestored, OrderCommand, OrderCreated, OrderDetailsUpdated,
    OrderEvent, OrderSnapshot, ProductionOrder, StateChange, StateChanged, TransitionState,
    UpdateOrderDetails,
};
pub use state::{OrderState, Priority};
