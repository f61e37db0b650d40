//! Movement ledger rows and the arithmetic behind each movement type.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{DomainError, DomainResult, Entity, ItemId, MovementId, OrderId, Quantity, UserId};

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Stock comes in: `after = before + quantity`.
    Entrada,
    /// Stock goes out: `after = before - quantity`, never below zero.
    Salida,
    /// Physical count: `quantity` is the new absolute value.
    Ajuste,
}

impl MovementType {
    pub const ALL: [MovementType; 3] = [Self::Entrada, Self::Salida, Self::Ajuste];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entrada => "ENTRADA",
            Self::Salida => "SALIDA",
            Self::Ajuste => "AJUSTE",
        }
    }

    /// Signed change this movement requests against `before`.
    ///
    /// ENTRADA/SALIDA quantities must be strictly positive; an AJUSTE must
    /// actually change the quantity.
    pub fn requested_delta(&self, before: Quantity, quantity: Decimal) -> DomainResult<Decimal> {
        match self {
            Self::Entrada => Ok(Quantity::positive(quantity)?.value()),
            Self::Salida => Ok(-Quantity::positive(quantity)?.value()),
            Self::Ajuste => {
                let target = Quantity::new(quantity)?;
                if target == before {
                    return Err(DomainError::validation(format!(
                        "adjustment to {target} does not change the quantity on hand"
                    )));
                }
                Ok(target.value() - before.value())
            }
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ENTRADA" => Ok(Self::Entrada),
            "SALIDA" => Ok(Self::Salida),
            "AJUSTE" => Ok(Self::Ajuste),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}' (expected ENTRADA, SALIDA or AJUSTE)"
            ))),
        }
    }
}

/// Why a movement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    InitialStock,
    Manual,
    OrderReservation,
    CancellationRestoration,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialStock => "initial_stock",
            Self::Manual => "manual",
            Self::OrderReservation => "order_reservation",
            Self::CancellationRestoration => "cancellation_restoration",
        }
    }
}

impl core::str::FromStr for MovementReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial_stock" => Ok(Self::InitialStock),
            "manual" => Ok(Self::Manual),
            "order_reservation" => Ok(Self::OrderReservation),
            "cancellation_restoration" => Ok(Self::CancellationRestoration),
            other => Err(DomainError::validation(format!("unknown movement reason '{other}'"))),
        }
    }
}

/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: MovementId,
    pub item_id: ItemId,
    pub movement_type: MovementType,
    /// Amount as requested: moved amount for ENTRADA/SALIDA, target for AJUSTE.
    pub quantity: Quantity,
    pub quantity_before: Quantity,
    pub quantity_after: Quantity,
    pub related_order_id: Option<OrderId>,
    pub actor: UserId,
    pub reason: MovementReason,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MovementEntry {
    /// Signed effect on the item's quantity on hand.
    pub fn delta(&self) -> Decimal {
        self.quantity_after.value() - self.quantity_before.value()
    }

    pub fn is_restoration_for(&self, order_id: OrderId, item_id: ItemId) -> bool {
        self.reason == MovementReason::CancellationRestoration
            && self.related_order_id == Some(order_id)
            && self.item_id == item_id
    }
}

impl Entity for MovementEntry {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(v: i64) -> Quantity {
        Quantity::new(Decimal::from(v)).unwrap()
    }

    #[test]
    fn salida_delta_is_negative() {
        let d = MovementType::Salida.requested_delta(q(10), Decimal::from(4)).unwrap();
        assert_eq!(d, Decimal::from(-4));
    }

    #[test]
    fn ajuste_delta_is_relative_to_before() {
        let d = MovementType::Ajuste.requested_delta(q(10), Decimal::from(7)).unwrap();
        assert_eq!(d, Decimal::from(-3));
    }

    #[test]
    fn ajuste_to_same_value_is_rejected() {
        let err = MovementType::Ajuste.requested_delta(q(5), Decimal::from(5)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn entrada_requires_positive_quantity() {
        assert!(MovementType::Entrada.requested_delta(q(1), Decimal::ZERO).is_err());
        assert!(MovementType::Salida.requested_delta(q(1), Decimal::from(-2)).is_err());
    }

    #[test]
    fn movement_type_parses_case_insensitively() {
        assert_eq!("salida".parse::<MovementType>().unwrap(), MovementType::Salida);
        assert!("CONSUMO".parse::<MovementType>().is_err());
    }
}
