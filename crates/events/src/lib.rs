//! Domain event contract shared by the inventory and production crates.

pub mod event;

pub use event::Event;
