//! Order lifecycle states and priorities.

use serde::{Deserialize, Serialize};

use netfab_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pendiente,
    EnProceso,
    Completada,
    Cancelada,
    Pausada,
}

impl OrderState {
    pub const ALL: [OrderState; 5] = [
        Self::Pendiente,
        Self::EnProceso,
        Self::Completada,
        Self::Cancelada,
        Self::Pausada,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::EnProceso => "en_proceso",
            Self::Completada => "completada",
            Self::Cancelada => "cancelada",
            Self::Pausada => "pausada",
        }
    }

    /// `completada` and `cancelada` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completada | Self::Cancelada)
    }

    pub fn allowed_targets(&self) -> &'static [OrderState] {
        match self {
            Self::Pendiente => &[Self::EnProceso, Self::Cancelada],
            Self::EnProceso => &[Self::Completada, Self::Cancelada, Self::Pausada],
            Self::Pausada => &[Self::EnProceso, Self::Cancelada],
            Self::Completada | Self::Cancelada => &[],
        }
    }

    pub fn can_transition_to(&self, to: OrderState) -> bool {
        self.allowed_targets().contains(&to)
    }
}

impl core::fmt::Display for OrderState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order state '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Baja,
    #[default]
    Media,
    Alta,
    Urgente,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Baja, Self::Media, Self::Alta, Self::Urgente];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baja => "baja",
            Self::Media => "media",
            Self::Alta => "alta",
            Self::Urgente => "urgente",
        }
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown priority '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_targets() {
        for state in OrderState::ALL {
            assert_eq!(state.is_terminal(), state.allowed_targets().is_empty());
        }
    }

    #[test]
    fn paused_orders_resume_or_cancel() {
        assert!(OrderState::Pausada.can_transition_to(OrderState::EnProceso));
        assert!(OrderState::Pausada.can_transition_to(OrderState::Cancelada));
        assert!(!OrderState::Pausada.can_transition_to(OrderState::Completada));
        assert!(!OrderState::Pendiente.can_transition_to(OrderState::Completada));
    }

    #[test]
    fn states_round_trip_through_strings() {
        for state in OrderState::ALL {
            assert_eq!(state.as_str().parse::<OrderState>().unwrap(), state);
        }
        assert!("EN_PROCESO".parse::<OrderState>().is_err());
        assert_eq!(Priority::default(), Priority::Media);
    }
}
