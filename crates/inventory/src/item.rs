use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{
    Aggregate, AggregateRoot, DomainError, ItemId, MovementId, OrderId, Quantity, UserId,
    ensure_scale,
};
use netfab_events::Event;

use crate::movement::{MovementEntry, MovementReason, MovementType};

/// What kind of stock an item is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    /// Paño: mesh/netting sheet, usually counted in m².
    Panel,
    #[default]
    Material,
    Tool,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Material => "material",
            Self::Tool => "tool",
        }
    }
}

impl core::fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ItemCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "panel" | "pano" => Ok(Self::Panel),
            "material" => Ok(Self::Material),
            "tool" | "herramienta" => Ok(Self::Tool),
            other => Err(DomainError::validation(format!(
                "unknown item category '{other}' (expected panel, material or tool)"
            ))),
        }
    }
}

/// Static catalog data of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub code: String,
    pub name: String,
    pub category: ItemCategory,
    pub unit: String,
    /// Default cost per unit, copied onto order lines that don't set one.
    pub unit_cost: Decimal,
}

impl Default for ItemDetails {
    fn default() -> Self {
        Self {
            code: String::new(),
            name: String::new(),
            category: ItemCategory::default(),
            unit: "unidad".to_string(),
            unit_cost: Decimal::ZERO,
        }
    }
}

/// Aggregate root: InventoryItem.
///
/// The movement ledger is this aggregate's event stream: the only way to
/// change `quantity_on_hand` is a `MovementRecorded` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: ItemId,
    details: ItemDetails,
    quantity_on_hand: Quantity,
    active: bool,
    version: u64,
    registered: bool,
}

impl InventoryItem {
    /// Not-yet-registered instance, the starting point for `RegisterItem`.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            details: ItemDetails::default(),
            quantity_on_hand: Quantity::ZERO,
            active: false,
            version: 0,
            registered: false,
        }
    }

    /// Rebuild from a persisted row.
    pub fn rehydrate(
        id: ItemId,
        details: ItemDetails,
        quantity_on_hand: Quantity,
        active: bool,
        version: u64,
    ) -> Self {
        Self {
            id,
            details,
            quantity_on_hand,
            active,
            version,
            registered: true,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn category(&self) -> ItemCategory {
        self.details.category
    }

    pub fn quantity_on_hand(&self) -> Quantity {
        self.quantity_on_hand
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub details: ItemDetails,
    /// Opening stock, booked as an ENTRADA so the ledger explains it.
    pub initial_quantity: Decimal,
    pub opening_movement_id: MovementId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    pub item_id: ItemId,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub related_order_id: Option<OrderId>,
    pub actor: UserId,
    pub reason: MovementReason,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItemDetails.
///
/// `None` keeps the current value. Code and category are fixed at
/// registration: existing order lines were typed against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemDetails {
    pub item_id: ItemId,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub unit_cost: Option<Decimal>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RetireItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireItem {
    pub item_id: ItemId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    RegisterItem(RegisterItem),
    RecordMovement(RecordMovement),
    UpdateItemDetails(UpdateItemDetails),
    RetireItem(RetireItem),
}

/// Event: ItemRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistered {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDetailsUpdated. Carries the full details after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetailsUpdated {
    pub item_id: ItemId,
    pub details: ItemDetails,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRetired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRetired {
    pub item_id: ItemId,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemRegistered(ItemRegistered),
    /// The ledger row itself.
    MovementRecorded(MovementEntry),
    ItemDetailsUpdated(ItemDetailsUpdated),
    ItemRetired(ItemRetired),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemRegistered(_) => "inventory.item.registered",
            InventoryEvent::MovementRecorded(_) => "inventory.movement.recorded",
            InventoryEvent::ItemDetailsUpdated(_) => "inventory.item.details_updated",
            InventoryEvent::ItemRetired(_) => "inventory.item.retired",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemRegistered(e) => e.occurred_at,
            InventoryEvent::MovementRecorded(e) => e.recorded_at,
            InventoryEvent::ItemDetailsUpdated(e) => e.occurred_at,
            InventoryEvent::ItemRetired(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemRegistered(e) => {
                self.id = e.item_id;
                self.details = e.details.clone();
                self.quantity_on_hand = Quantity::ZERO;
                self.active = true;
                self.registered = true;
            }
            InventoryEvent::MovementRecorded(e) => {
                self.quantity_on_hand = e.quantity_after;
            }
            InventoryEvent::ItemDetailsUpdated(e) => {
                self.details = e.details.clone();
            }
            InventoryEvent::ItemRetired(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::RegisterItem(cmd) => self.handle_register(cmd),
            InventoryCommand::RecordMovement(cmd) => self.handle_record(cmd),
            InventoryCommand::UpdateItemDetails(cmd) => self.handle_update_details(cmd),
            InventoryCommand::RetireItem(cmd) => self.handle_retire(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_available(&self, item_id: ItemId) -> Result<(), DomainError> {
        if !self.registered || !self.active {
            return Err(DomainError::not_found(format!("item {item_id}")));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    /// Apply a signed delta to the quantity on hand.
    ///
    /// Reachable only through `RecordMovement`; nothing else may move stock.
    fn adjust_quantity(&self, delta: Decimal, requested: Decimal) -> Result<Quantity, DomainError> {
        let next = self.quantity_on_hand.value() + delta;
        if next.is_sign_negative() && !next.is_zero() {
            return Err(DomainError::InsufficientStock {
                item_id: self.id,
                available: self.quantity_on_hand.value(),
                requested,
            });
        }
        Quantity::new(next)
    }

    fn handle_register(&self, cmd: &RegisterItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.registered {
            return Err(DomainError::conflict(format!("item {} already exists", cmd.item_id)));
        }
        let d = &cmd.details;
        if d.code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if d.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if d.unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        if d.unit_cost.is_sign_negative() && !d.unit_cost.is_zero() {
            return Err(DomainError::validation("unit_cost cannot be negative"));
        }
        ensure_scale(d.unit_cost, "unit_cost")?;
        let opening = Quantity::new(cmd.initial_quantity)?;

        let mut events = vec![InventoryEvent::ItemRegistered(ItemRegistered {
            item_id: cmd.item_id,
            details: ItemDetails {
                code: d.code.trim().to_string(),
                name: d.name.trim().to_string(),
                category: d.category,
                unit: d.unit.trim().to_string(),
                unit_cost: d.unit_cost,
            },
            occurred_at: cmd.occurred_at,
        })];

        if !opening.is_zero() {
            events.push(InventoryEvent::MovementRecorded(MovementEntry {
                id: cmd.opening_movement_id,
                item_id: cmd.item_id,
                movement_type: MovementType::Entrada,
                quantity: opening,
                quantity_before: Quantity::ZERO,
                quantity_after: opening,
                related_order_id: None,
                actor: cmd.actor,
                reason: MovementReason::InitialStock,
                notes: None,
                recorded_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_available(cmd.item_id)?;

        let before = self.quantity_on_hand;
        let delta = cmd.movement_type.requested_delta(before, cmd.quantity)?;
        let after = self.adjust_quantity(delta, cmd.quantity)?;

        Ok(vec![InventoryEvent::MovementRecorded(MovementEntry {
            id: cmd.movement_id,
            item_id: cmd.item_id,
            movement_type: cmd.movement_type,
            quantity: Quantity::new(cmd.quantity)?,
            quantity_before: before,
            quantity_after: after,
            related_order_id: cmd.related_order_id,
            actor: cmd.actor,
            reason: cmd.reason,
            notes: cmd.notes.clone(),
            recorded_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateItemDetails) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_available(cmd.item_id)?;

        let mut details = self.details.clone();
        if let Some(name) = &cmd.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("name cannot be empty"));
            }
            details.name = name.trim().to_string();
        }
        if let Some(unit) = &cmd.unit {
            if unit.trim().is_empty() {
                return Err(DomainError::validation("unit cannot be empty"));
            }
            details.unit = unit.trim().to_string();
        }
        if let Some(unit_cost) = cmd.unit_cost {
            if unit_cost.is_sign_negative() && !unit_cost.is_zero() {
                return Err(DomainError::validation("unit_cost cannot be negative"));
            }
            ensure_scale(unit_cost, "unit_cost")?;
            details.unit_cost = unit_cost;
        }

        if details == self.details {
            return Ok(Vec::new());
        }
        Ok(vec![InventoryEvent::ItemDetailsUpdated(ItemDetailsUpdated {
            item_id: cmd.item_id,
            details,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetireItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_available(cmd.item_id)?;
        Ok(vec![InventoryEvent::ItemRetired(ItemRetired {
            item_id: cmd.item_id,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }
}
