use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use netfab_core::{Aggregate, AggregateRoot, DomainError, OrderId, UserId};
use netfab_events::Event;

use crate::line::{LineDraft, OrderLine};
use crate::number::OrderNumber;
use crate::state::{OrderState, Priority};

/// One entry of an order's state history. `from` is `None` for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: Option<OrderState>,
    pub to: OrderState,
    pub comment: Option<String>,
    pub actor: UserId,
    pub changed_at: DateTime<Utc>,
}

/// Aggregate root: ProductionOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionOrder {
    id: OrderId,
    order_number: Option<OrderNumber>,
    client: String,
    notes: Option<String>,
    state: OrderState,
    priority: Priority,
    created_at: Option<DateTime<Utc>>,
    lines: Vec<OrderLine>,
    history: Vec<StateChange>,
    version: u64,
    created: bool,
}

/// Persisted shape of an order, used to rebuild the aggregate from rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub client: String,
    pub notes: Option<String>,
    pub state: OrderState,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub history: Vec<StateChange>,
    pub version: u64,
}

impl ProductionOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: None,
            client: String::new(),
            notes: None,
            state: OrderState::Pendiente,
            priority: Priority::default(),
            created_at: None,
            lines: Vec::new(),
            history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn rehydrate(snapshot: OrderSnapshot) -> Self {
        Self {
            id: snapshot.id,
            order_number: Some(snapshot.order_number),
            client: snapshot.client,
            notes: snapshot.notes,
            state: snapshot.state,
            priority: snapshot.priority,
            created_at: Some(snapshot.created_at),
            lines: snapshot.lines,
            history: snapshot.history,
            version: snapshot.version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn total_cost(&self) -> Decimal {
        self.lines.iter().map(|l| l.total_cost).sum()
    }

    /// Lines whose committed stock has not been given back yet.
    pub fn lines_awaiting_restoration(&self) -> impl Iterator<Item = &OrderLine> {
        self.lines.iter().filter(|l| l.awaiting_restoration())
    }
}

impl AggregateRoot for ProductionOrder {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub client: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub lines: Vec<LineDraft>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionState.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionState {
    pub order_id: OrderId,
    pub to: OrderState,
    pub comment: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateOrderDetails.
///
/// `None` keeps the current value; `notes: Some("")` clears the notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderDetails {
    pub order_id: OrderId,
    pub client: Option<String>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkLineRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLineRestored {
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    TransitionState(TransitionState),
    UpdateOrderDetails(UpdateOrderDetails),
    MarkLineRestored(MarkLineRestored),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub client: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub lines: Vec<OrderLine>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChanged {
    pub order_id: OrderId,
    pub change: StateChange,
}

/// Event: OrderDetailsUpdated. Carries the header after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetailsUpdated {
    pub order_id: OrderId,
    pub client: String,
    pub priority: Priority,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRestored {
    pub order_id: OrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    StateChanged(StateChanged),
    DetailsUpdated(OrderDetailsUpdated),
    LineRestored(LineRestored),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "production.order.created",
            OrderEvent::StateChanged(_) => "production.order.state_changed",
            OrderEvent::DetailsUpdated(_) => "production.order.details_updated",
            OrderEvent::LineRestored(_) => "production.order.line_restored",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::StateChanged(e) => e.change.changed_at,
            OrderEvent::DetailsUpdated(e) => e.occurred_at,
            OrderEvent::LineRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ProductionOrder {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = Some(e.order_number.clone());
                self.client = e.client.clone();
                self.notes = e.notes.clone();
                self.priority = e.priority;
                self.state = OrderState::Pendiente;
                self.created_at = Some(e.occurred_at);
                self.lines = e.lines.clone();
                self.history = vec![StateChange {
                    from: None,
                    to: OrderState::Pendiente,
                    comment: None,
                    actor: e.actor,
                    changed_at: e.occurred_at,
                }];
                self.created = true;
            }
            OrderEvent::StateChanged(e) => {
                self.state = e.change.to;
                self.history.push(e.change.clone());
            }
            OrderEvent::DetailsUpdated(e) => {
                self.client = e.client.clone();
                self.priority = e.priority;
                self.notes = e.notes.clone();
            }
            OrderEvent::LineRestored(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.restored = true;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::TransitionState(cmd) => self.handle_transition(cmd),
            OrderCommand::UpdateOrderDetails(cmd) => self.handle_update_details(cmd),
            OrderCommand::MarkLineRestored(cmd) => self.handle_mark_restored(cmd),
        }
    }
}

impl ProductionOrder {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("order {}", self.id)));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("order {} already exists", cmd.order_id)));
        }
        let client = cmd.client.trim();
        if client.is_empty() {
            return Err(DomainError::validation("client cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line"));
        }

        let lines = cmd
            .lines
            .iter()
            .zip(1u32..)
            .map(|(draft, line_no)| OrderLine::from_draft(line_no, draft))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            client: client.to_string(),
            priority: cmd.priority,
            notes: cmd.notes.clone(),
            lines,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionState) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        // Cancelling twice is a no-op.
        if self.state == OrderState::Cancelada && cmd.to == OrderState::Cancelada {
            return Ok(vec![]);
        }
        if !self.state.can_transition_to(cmd.to) {
            return Err(DomainError::invalid_transition(self.state, cmd.to));
        }
        if cmd.to == OrderState::Cancelada {
            if let Some(line) = self.lines_awaiting_restoration().next() {
                return Err(DomainError::invariant(format!(
                    "line {} must be restored before cancelling",
                    line.line_no
                )));
            }
        }

        Ok(vec![OrderEvent::StateChanged(StateChanged {
            order_id: cmd.order_id,
            change: StateChange {
                from: Some(self.state),
                to: cmd.to,
                comment: cmd.comment.clone(),
                actor: cmd.actor,
                changed_at: cmd.occurred_at,
            },
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateOrderDetails) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        if self.state != OrderState::Pendiente {
            return Err(DomainError::validation(format!(
                "order {} is {}, only pending orders can be edited",
                self.id, self.state
            )));
        }

        let client = match &cmd.client {
            Some(client) if client.trim().is_empty() => {
                return Err(DomainError::validation("client cannot be empty"));
            }
            Some(client) => client.trim().to_string(),
            None => self.client.clone(),
        };
        let notes = match &cmd.notes {
            Some(notes) if notes.trim().is_empty() => None,
            Some(notes) => Some(notes.clone()),
            None => self.notes.clone(),
        };
        let priority = cmd.priority.unwrap_or(self.priority);

        if client == self.client && notes == self.notes && priority == self.priority {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::DetailsUpdated(OrderDetailsUpdated {
            order_id: cmd.order_id,
            client,
            priority,
            notes,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_restored(&self, cmd: &MarkLineRestored) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        let line = self
            .line(cmd.line_no)
            .ok_or_else(|| DomainError::not_found(format!("line {} of order {}", cmd.line_no, self.id)))?;
        if !line.item_type.reserves_stock() {
            return Err(DomainError::validation(format!(
                "line {} ({}) holds no reserved stock",
                line.line_no, line.item_type
            )));
        }
        if line.restored {
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::LineRestored(LineRestored {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }
}
