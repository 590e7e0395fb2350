// In crates/core-types/src/lib.rs

pub mod config;
pub mod error;
pub mod fees;
pub mod interval;
pub mod position;
pub mod precision;
pub mod strategy;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use config::{
    BotConfig, CooldownPolicy, ExecutionMode, FeatureToggles, LifecycleSettings,
    ManagementSettings, RiskSettings,
};
pub use error::{Error, Result};
pub use interval::Interval;
pub use position::{NewPosition, Position};
pub use precision::PrecisionRules;
pub use strategy::StrategyConfig;
pub use types::{Direction, ExitReason, Kline, Side, Signal, StopReason, Symbol, TradeRecord};
