use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use netfab_core::{AggregateRoot, DomainError, ItemId};
use netfab_infra::services::{
    ItemChanges, MovementRequest, NewItem, NewLine, NewOrder, OrderChanges, StockAlerts, StockCheck,
};
use netfab_infra::store::{ItemFilter, MovementFilter, OrderFilter, Pagination};
use netfab_inventory::{InventoryItem, ItemCategory, MovementType};
use netfab_production::{LineItemType, OrderState, Priority, ProductionOrder};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub initial_quantity: Option<Decimal>,
}

impl CreateItemRequest {
    pub fn validate(self) -> Result<NewItem, DomainError> {
        let category: ItemCategory = self.category.parse()?;
        Ok(NewItem {
            code: self.code,
            name: self.name,
            category,
            unit: self.unit.unwrap_or_else(|| "unidad".to_string()),
            unit_cost: self.unit_cost.unwrap_or(Decimal::ZERO),
            initial_quantity: self.initial_quantity.unwrap_or(Decimal::ZERO),
        })
    }
}

/// Partial edit; absent fields stay as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub code: Option<String>,
    pub category: Option<String>,
}

impl UpdateItemRequest {
    pub fn validate(self) -> Result<ItemChanges, DomainError> {
        if self.code.is_some() || self.category.is_some() {
            return Err(DomainError::validation(
                "code and category are fixed once an item is registered",
            ));
        }
        Ok(ItemChanges {
            name: self.name,
            unit: self.unit,
            unit_cost: self.unit_cost,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordMovementRequest {
    pub item_id: String,
    pub movement_type: String,
    pub quantity: Decimal,
    pub related_order_id: Option<String>,
    pub notes: Option<String>,
}

impl RecordMovementRequest {
    pub fn validate(self) -> Result<MovementRequest, DomainError> {
        Ok(MovementRequest {
            item_id: self.item_id.trim().parse()?,
            movement_type: self.movement_type.parse()?,
            quantity: self.quantity,
            related_order_id: parse_optional(self.related_order_id.as_deref())?,
            notes: non_blank(self.notes),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderLineRequest {
    pub item_id: String,
    pub item_type: Option<String>,
    pub quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client: String,
    pub priority: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<CreateOrderLineRequest>,
}

impl CreateOrderRequest {
    pub fn validate(self) -> Result<NewOrder, DomainError> {
        let priority: Priority = parse_optional(self.priority.as_deref())?.unwrap_or_default();
        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(idx, line)| {
                let item_id: ItemId = line
                    .item_id
                    .trim()
                    .parse()
                    .map_err(|e: DomainError| DomainError::validation(format!("line {}: {e}", idx + 1)))?;
                let item_type: Option<LineItemType> = parse_optional(line.item_type.as_deref())?;
                Ok(NewLine {
                    item_id,
                    item_type,
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                    notes: non_blank(line.notes),
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(NewOrder {
            client: self.client,
            priority,
            notes: non_blank(self.notes),
            lines,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub client: Option<String>,
    pub priority: Option<String>,
    /// An empty string clears the notes.
    pub notes: Option<String>,
}

impl UpdateOrderRequest {
    pub fn validate(self) -> Result<OrderChanges, DomainError> {
        Ok(OrderChanges {
            client: self.client,
            priority: parse_optional(self.priority.as_deref())?,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityLineRequest {
    pub item_id: String,
    pub item_type: Option<String>,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub lines: Vec<AvailabilityLineRequest>,
}

impl AvailabilityRequest {
    pub fn validate(self) -> Result<Vec<StockCheck>, DomainError> {
        self.lines
            .into_iter()
            .enumerate()
            .map(|(idx, line)| {
                let item_id: ItemId = line
                    .item_id
                    .trim()
                    .parse()
                    .map_err(|e: DomainError| DomainError::validation(format!("line {}: {e}", idx + 1)))?;
                Ok(StockCheck {
                    item_id,
                    item_type: parse_optional(line.item_type.as_deref())?,
                    quantity: line.quantity,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionStateRequest {
    pub state: String,
    pub comment: Option<String>,
}

impl TransitionStateRequest {
    pub fn validate(self) -> Result<(OrderState, Option<String>), DomainError> {
        Ok((self.state.parse()?, non_blank(self.comment)))
    }
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub include_retired: bool,
}

impl ListItemsQuery {
    pub fn into_filter(self) -> Result<ItemFilter, DomainError> {
        Ok(ItemFilter {
            category: parse_optional(self.category.as_deref())?,
            include_retired: self.include_retired,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsQuery {
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub item_id: Option<String>,
    pub order_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListMovementsQuery {
    pub fn into_filter(self) -> Result<(MovementFilter, Pagination), DomainError> {
        let movement_type: Option<MovementType> = parse_optional(self.movement_type.as_deref())?;
        let filter = MovementFilter {
            movement_type,
            item_id: parse_optional(self.item_id.as_deref())?,
            order_id: parse_optional(self.order_id.as_deref())?,
            from: self.from,
            to: self.to,
        };
        Ok((filter, Pagination::new(self.limit, self.offset)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    /// Panels and materials at or below this are low on stock.
    pub threshold: Option<Decimal>,
}

impl AlertsQuery {
    pub const DEFAULT_THRESHOLD: i64 = 10;

    pub fn threshold(&self) -> Decimal {
        self.threshold.unwrap_or(Decimal::from(Self::DEFAULT_THRESHOLD))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub state: Option<String>,
    pub priority: Option<String>,
    pub client: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOrdersQuery {
    pub fn into_filter(self) -> Result<(OrderFilter, Pagination), DomainError> {
        let state: Option<OrderState> = parse_optional(self.state.as_deref())?;
        let priority: Option<Priority> = parse_optional(self.priority.as_deref())?;
        let filter = OrderFilter {
            state,
            priority,
            client: non_blank(self.client),
        };
        Ok((filter, Pagination::new(self.limit, self.offset)))
    }
}

fn parse_optional<T>(raw: Option<&str>) -> Result<Option<T>, DomainError>
where
    T: core::str::FromStr<Err = DomainError>,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn item_to_json(item: &InventoryItem) -> serde_json::Value {
    let details = item.details();
    serde_json::json!({
        "id": item.id().to_string(),
        "code": details.code,
        "name": details.name,
        "category": details.category,
        "unit": details.unit,
        "unit_cost": details.unit_cost,
        "quantity_on_hand": item.quantity_on_hand(),
        "active": item.is_active(),
        "version": item.version(),
    })
}

pub fn order_to_json(order: &ProductionOrder) -> serde_json::Value {
    serde_json::json!({
        "id": order.id().to_string(),
        "order_number": order.order_number().map(ToString::to_string),
        "client": order.client(),
        "notes": order.notes(),
        "state": order.state(),
        "priority": order.priority(),
        "created_at": order.created_at(),
        "total_cost": order.total_cost(),
        "lines": order.lines(),
        "history": order.history(),
        "version": order.version(),
    })
}

pub fn alerts_to_json(alerts: &StockAlerts) -> serde_json::Value {
    let items = |items: &[InventoryItem]| items.iter().map(item_to_json).collect::<Vec<_>>();
    serde_json::json!({
        "threshold": alerts.threshold,
        "out_of_stock": items(&alerts.out_of_stock),
        "low_stock": items(&alerts.low_stock),
        "tools_in_use": alerts
            .tools_in_use
            .iter()
            .map(|t| serde_json::json!({
                "item": item_to_json(&t.item),
                "order_numbers": t.order_numbers,
            }))
            .collect::<Vec<_>>(),
        "total": alerts.total(),
    })
}

/// Compact form used by listings (no lines, no history).
pub fn order_summary_to_json(order: &ProductionOrder) -> serde_json::Value {
    serde_json::json!({
        "id": order.id().to_string(),
        "order_number": order.order_number().map(ToString::to_string),
        "client": order.client(),
        "state": order.state(),
        "priority": order.priority(),
        "created_at": order.created_at(),
        "total_cost": order.total_cost(),
        "line_count": order.lines().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_item_defaults_unit_and_amounts() {
        let req: CreateItemRequest = serde_json::from_value(serde_json::json!({
            "code": "PN-1",
            "name": "Paño nylon",
            "category": "pano",
        }))
        .unwrap();
        let item = req.validate().unwrap();
        assert_eq!(item.category, ItemCategory::Panel);
        assert_eq!(item.unit, "unidad");
        assert_eq!(item.initial_quantity, Decimal::ZERO);
    }

    #[test]
    fn movement_type_is_case_insensitive_and_ids_are_checked() {
        let item_id = ItemId::new();
        let req = RecordMovementRequest {
            item_id: item_id.to_string(),
            movement_type: "salida".to_string(),
            quantity: Decimal::ONE,
            related_order_id: Some(" ".to_string()),
            notes: Some(String::new()),
        };
        let movement = req.validate().unwrap();
        assert_eq!(movement.item_id, item_id);
        assert_eq!(movement.movement_type, MovementType::Salida);
        assert_eq!(movement.related_order_id, None);
        assert_eq!(movement.notes, None);

        let bad = RecordMovementRequest {
            item_id: "nope".to_string(),
            movement_type: "ENTRADA".to_string(),
            quantity: Decimal::ONE,
            related_order_id: None,
            notes: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn order_request_reports_the_bad_line() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "client": "Acme",
            "lines": [
                { "item_id": ItemId::new().to_string(), "quantity": "2.5" },
                { "item_id": "bad", "quantity": 1 },
            ],
        }))
        .unwrap();
        let err = req.validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref msg) if msg.starts_with("line 2")));
    }

    #[test]
    fn order_request_defaults_priority() {
        let req: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "client": "Acme",
            "lines": [{ "item_id": ItemId::new().to_string(), "quantity": 1, "item_type": "material" }],
        }))
        .unwrap();
        let order = req.validate().unwrap();
        assert_eq!(order.priority, Priority::Media);
        assert_eq!(order.lines[0].item_type, Some(LineItemType::Material));
    }

    #[test]
    fn item_edits_cannot_touch_code_or_category() {
        let req: UpdateItemRequest = serde_json::from_value(serde_json::json!({
            "name": "Hilo",
            "unit_cost": "1.25",
        }))
        .unwrap();
        let changes = req.validate().unwrap();
        assert_eq!(changes.unit_cost, Some(Decimal::new(125, 2)));
        assert_eq!(changes.unit, None);

        let req = UpdateItemRequest {
            code: Some("NEW".to_string()),
            ..UpdateItemRequest::default()
        };
        assert!(matches!(req.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn availability_request_parses_types_and_reports_bad_ids() {
        let item_id = ItemId::new();
        let req: AvailabilityRequest = serde_json::from_value(serde_json::json!({
            "lines": [{ "item_id": item_id.to_string(), "item_type": "herramienta", "quantity": 1 }],
        }))
        .unwrap();
        let checks = req.validate().unwrap();
        assert_eq!(checks[0].item_id, item_id);
        assert_eq!(checks[0].item_type, Some(LineItemType::Herramienta));

        let req: AvailabilityRequest = serde_json::from_value(serde_json::json!({
            "lines": [{ "item_id": "??", "quantity": 1 }],
        }))
        .unwrap();
        assert!(matches!(req.validate(), Err(DomainError::Validation(ref m)) if m.starts_with("line 1")));
    }

    #[test]
    fn alerts_threshold_defaults() {
        assert_eq!(AlertsQuery::default().threshold(), Decimal::from(10));
    }

    #[test]
    fn unknown_filter_values_are_rejected() {
        let query = ListOrdersQuery {
            state: Some("archivada".to_string()),
            ..ListOrdersQuery::default()
        };
        assert!(query.into_filter().is_err());

        let query = ListOrdersQuery {
            state: Some("en_proceso".to_string()),
            client: Some("  ".to_string()),
            ..ListOrdersQuery::default()
        };
        let (filter, pagination) = query.into_filter().unwrap();
        assert_eq!(filter.state, Some(OrderState::EnProceso));
        assert_eq!(filter.client, None);
        assert_eq!(pagination, Pagination::default());
    }

    #[test]
    fn malformed_order_id_in_filter_is_an_invalid_id() {
        let query = ListMovementsQuery {
            order_id: Some("x".to_string()),
            ..ListMovementsQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(DomainError::InvalidId(_))));
    }
}
