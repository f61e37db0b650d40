//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ItemId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One detail line that could not be given back during a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationFailure {
    pub line_no: u32,
    pub item_id: ItemId,
    pub reason: String,
}

/// Domain-level error.
///
/// Deterministic business failures only. Storage problems live in the
/// infrastructure layer and are mapped onto [`DomainError::Conflict`] when
/// they mean "someone else got there first".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (non-positive quantity, empty client, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown (or retired) item, unknown order.
    #[error("not found: {0}")]
    NotFound(String),

    /// A SALIDA would drive the item below zero.
    #[error("insufficient stock for item {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: ItemId,
        available: Decimal,
        requested: Decimal,
    },

    /// The order state table does not allow this change.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Cancellation could not give back every reserved line.
    #[error("partial restoration: {restored} line(s) restored, {} failed", failed.len())]
    PartialRestoration {
        restored: usize,
        failed: Vec<RestorationFailure>,
    },

    /// Lock or version conflict; the only error a caller may retry blindly.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
