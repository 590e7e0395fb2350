// In crates/risk/src/lib.rs

use core_types::BotConfig;
use strategies::Strategy;

pub mod error;
pub mod sizing;
pub mod target_engine;
pub mod types;

// Re-export public types
pub use core_types::fees;
pub use error::{Error, Result};
pub use target_engine::{check_reward_risk, TargetEngine};
pub use types::{PlanRequest, TargetPlan};

/// The universal interface for deriving the initial stop and target of an entry.
///
/// Implementations must be pure: the same request, strategy and configuration
/// always produce the same plan.
pub trait RiskManager: Send + Sync {
    /// The name of the risk management strategy.
    fn name(&self) -> &'static str;

    /// Computes the initial protective levels for an entry.
    ///
    /// # Returns
    ///
    /// * `Ok(TargetPlan)`: stop and target strictly on the correct side of entry.
    /// * `Err(Error::InsufficientData)`: no usable price or size; retry later.
    /// * `Err(Error::HardCapUnachievable)`: the loss cap is tighter than one tick.
    /// * `Err(Error::InvalidTargets)`: even the fallback levels were invalid.
    fn plan(
        &self,
        request: &PlanRequest<'_>,
        strategy: &dyn Strategy,
        config: &BotConfig,
    ) -> Result<TargetPlan>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use core_types::{BotConfig, Interval, PrecisionRules, StrategyConfig};
    use rust_decimal_macros::dec;

    pub fn config() -> BotConfig {
        BotConfig {
            symbol: "BTCUSDT".into(),
            interval: Interval::H1,
            strategy: StrategyConfig::new("supertrend", toml::Value::Table(Default::default())),
            allocated_capital: dec!(1000),
            leverage: 1,
            mode: Default::default(),
            features: Default::default(),
            fee_rate: dec!(0.0002),
            precision: PrecisionRules {
                tick_size: dec!(0.01),
                step_size: dec!(0.001),
                min_quantity: dec!(0.001),
            },
            risk: Default::default(),
            management: Default::default(),
            lifecycle: Default::default(),
        }
    }
}
