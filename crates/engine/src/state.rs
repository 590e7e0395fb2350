// In crates/engine/src/state.rs

use core_types::{Position, Signal, TradeRecord};
use serde::Serialize;
use std::fmt;

/// The lifecycle state of one bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BotState {
    Starting,
    Monitoring,
    ExecutingEntry,
    PositionOpen,
    /// Flat, but no entry before `until` (unix ms).
    Cooldown { until: i64 },
    Paused,
    Stopped,
    /// Halts all automatic action until the operator resets the bot.
    Error { reason: String },
}

impl BotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BotState::Stopped)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BotState::Error { .. })
    }

    /// Whether automatic event handling may act in this state.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            BotState::Paused | BotState::Stopped | BotState::Error { .. } | BotState::Starting
        )
    }

    /// The legal edges of the lifecycle. Leaving `Error` is reserved for an
    /// operator reset, which re-derives the state from venue facts.
    pub fn can_transition_to(&self, next: &BotState) -> bool {
        use BotState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (_, Error { .. }) => true,
            (Starting, Monitoring | Cooldown { .. } | PositionOpen | Paused) => true,
            (Monitoring, ExecutingEntry | Paused) => true,
            (ExecutingEntry, PositionOpen | Monitoring | Cooldown { .. } | Paused) => true,
            (PositionOpen, Monitoring | Cooldown { .. } | Paused) => true,
            (Cooldown { .. }, Monitoring | Paused) => true,
            (Paused, Monitoring | Cooldown { .. } | PositionOpen) => true,
            (Error { .. }, Monitoring | Cooldown { .. } | PositionOpen) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BotState::Starting => "starting",
            BotState::Monitoring => "monitoring",
            BotState::ExecutingEntry => "executing_entry",
            BotState::PositionOpen => "position_open",
            BotState::Cooldown { .. } => "cooldown",
            BotState::Paused => "paused",
            BotState::Stopped => "stopped",
            BotState::Error { .. } => "error",
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotState::Cooldown { until } => write!(f, "cooldown(until {})", until),
            BotState::Error { reason } => write!(f, "error({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// A point-in-time view of a bot, published to its handle after every event.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub bot_id: String,
    pub state: BotState,
    pub position: Option<Position>,
    pub last_trade: Option<TradeRecord>,
    pub preview: Option<Signal>,
}

impl BotStatus {
    pub fn starting(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            state: BotState::Starting,
            position: None,
            last_trade: None,
            preview: None,
        }
    }
}
