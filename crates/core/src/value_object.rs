//! Value objects: compared by value, never by identity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker for immutable, value-compared domain types.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Non-negative decimal amount of stock (units, metres, m²...).
///
/// Construction is the only place the sign is checked; arithmetic that could
/// go below zero is exposed as `checked_sub`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

/// Decimal places stored for quantities and costs (`NUMERIC(18, 4)`).
pub const MAX_SCALE: u32 = 4;

/// Reject amounts with more decimal places than the store keeps, so a value
/// is never rounded between the caller and the database.
pub fn ensure_scale(value: Decimal, what: &str) -> DomainResult<()> {
    if value.normalize().scale() > MAX_SCALE {
        return Err(DomainError::validation(format!(
            "{what} allows at most {MAX_SCALE} decimal places (got {value})"
        )));
    }
    Ok(())
}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(format!(
                "quantity cannot be negative (got {value})"
            )));
        }
        ensure_scale(value, "quantity")?;
        Ok(Self(value.normalize()))
    }

    /// Strictly positive quantity (order lines, ENTRADA/SALIDA amounts).
    pub fn positive(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "quantity must be positive (got {value})"
            )));
        }
        ensure_scale(value, "quantity")?;
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(|v| Quantity(v.normalize()))
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        Some(Quantity((self.0 - other.0).normalize()))
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(v: i64) -> Quantity {
        Quantity::new(Decimal::from(v)).unwrap()
    }

    #[test]
    fn rejects_negative_values() {
        assert!(Quantity::new(Decimal::from(-1)).is_err());
        assert!(Quantity::positive(Decimal::ZERO).is_err());
        assert!(Quantity::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn deserialize_validates_sign() {
        let ok: Quantity = serde_json::from_str("\"2.50\"").unwrap();
        assert_eq!(ok.value(), Decimal::new(25, 1));
        assert!(serde_json::from_str::<Quantity>("\"-1\"").is_err());
    }

    #[test]
    fn rejects_more_decimal_places_than_stored() {
        let err = Quantity::positive(Decimal::new(5, 5)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(Quantity::new(Decimal::new(100005, 5)).is_err());
        // Trailing zeros beyond the limit are not precision.
        assert_eq!(Quantity::new(Decimal::new(1_250_000, 6)).unwrap().value(), Decimal::new(125, 2));
        assert!(ensure_scale(Decimal::new(12345, 4), "unit_cost").is_ok());
    }

    proptest! {
        #[test]
        fn checked_sub_never_goes_negative(a in 0i64..10_000, b in 0i64..10_000) {
            match q(a).checked_sub(q(b)) {
                Some(r) => {
                    prop_assert!(a >= b);
                    prop_assert_eq!(r.value(), Decimal::from(a - b));
                }
                None => prop_assert!(b > a),
            }
        }
    }
}
