//! Order detail lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{DomainError, Entity, ItemId, LineId, Quantity, ensure_scale};
use netfab_inventory::ItemCategory;

/// What a detail line consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LineItemType {
    Pano,
    Material,
    Herramienta,
}

impl LineItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pano => "PANO",
            Self::Material => "MATERIAL",
            Self::Herramienta => "HERRAMIENTA",
        }
    }

    /// Tools are assigned to an order, not consumed, so they move no stock.
    pub fn reserves_stock(&self) -> bool {
        !matches!(self, Self::Herramienta)
    }

    pub fn matches(&self, category: ItemCategory) -> bool {
        matches!(
            (self, category),
            (Self::Pano, ItemCategory::Panel)
                | (Self::Material, ItemCategory::Material)
                | (Self::Herramienta, ItemCategory::Tool)
        )
    }

    pub fn for_category(category: ItemCategory) -> Self {
        match category {
            ItemCategory::Panel => Self::Pano,
            ItemCategory::Material => Self::Material,
            ItemCategory::Tool => Self::Herramienta,
        }
    }
}

impl core::fmt::Display for LineItemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for LineItemType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PANO" => Ok(Self::Pano),
            "MATERIAL" => Ok(Self::Material),
            "HERRAMIENTA" => Ok(Self::Herramienta),
            other => Err(DomainError::validation(format!("unknown line item type '{other}'"))),
        }
    }
}

/// Line as requested, before the order numbers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub line_id: LineId,
    pub item_id: ItemId,
    pub item_type: LineItemType,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_cost: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: LineId,
    /// 1-based position within the order.
    pub line_no: u32,
    pub item_id: ItemId,
    pub item_type: LineItemType,
    pub quantity_committed: Quantity,
    pub unit: String,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    /// Set once the committed quantity has been given back after cancellation.
    pub restored: bool,
}

impl OrderLine {
    pub fn from_draft(line_no: u32, draft: &LineDraft) -> Result<Self, DomainError> {
        let quantity_committed = Quantity::positive(draft.quantity).map_err(|e| match e {
            DomainError::Validation(msg) => DomainError::validation(format!("line {line_no}: {msg}")),
            other => other,
        })?;
        if draft.unit_cost.is_sign_negative() && !draft.unit_cost.is_zero() {
            return Err(DomainError::validation(format!(
                "line {line_no}: unit_cost cannot be negative"
            )));
        }
        ensure_scale(draft.unit_cost, &format!("line {line_no}: unit_cost"))?;
        if draft.unit.trim().is_empty() {
            return Err(DomainError::validation(format!("line {line_no}: unit cannot be empty")));
        }

        Ok(Self {
            id: draft.line_id,
            line_no,
            item_id: draft.item_id,
            item_type: draft.item_type,
            quantity_committed,
            unit: draft.unit.trim().to_string(),
            unit_cost: draft.unit_cost,
            total_cost: quantity_committed.value() * draft.unit_cost,
            notes: draft.notes.clone(),
            restored: false,
        })
    }

    /// Still holds stock that a cancellation must give back.
    pub fn awaiting_restoration(&self) -> bool {
        self.item_type.reserves_stock() && !self.restored
    }
}

impl Entity for OrderLine {
    type Id = LineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(quantity: i64, unit_cost: Decimal) -> LineDraft {
        LineDraft {
            line_id: LineId::new(),
            item_id: ItemId::new(),
            item_type: LineItemType::Pano,
            quantity: Decimal::from(quantity),
            unit: "m2".into(),
            unit_cost,
            notes: None,
        }
    }

    #[test]
    fn total_cost_is_quantity_times_unit_cost() {
        let line = OrderLine::from_draft(1, &draft(4, Decimal::new(250, 2))).unwrap();
        assert_eq!(line.total_cost, Decimal::from(10));
        assert!(line.awaiting_restoration());
    }

    #[test]
    fn rejects_zero_quantity_and_negative_cost() {
        assert!(OrderLine::from_draft(1, &draft(0, Decimal::ONE)).is_err());
        assert!(OrderLine::from_draft(1, &draft(1, Decimal::from(-1))).is_err());
    }

    #[test]
    fn rejects_amounts_finer_than_stored_precision() {
        let mut fine = draft(1, Decimal::ONE);
        fine.quantity = Decimal::new(5, 5);
        let err = OrderLine::from_draft(2, &fine).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m.starts_with("line 2:")));
        assert!(OrderLine::from_draft(1, &draft(1, Decimal::new(1, 5))).is_err());
    }

    #[test]
    fn tools_never_reserve() {
        assert!(!LineItemType::Herramienta.reserves_stock());
        assert!(LineItemType::Herramienta.matches(ItemCategory::Tool));
        assert!(!LineItemType::Pano.matches(ItemCategory::Material));
    }
}
