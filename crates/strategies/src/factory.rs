// In crates/strategies/src/factory.rs

use crate::error::{Error, Result};
use crate::types::{MACrossoverSettings, ProbReversionSettings, SuperTrendSettings};
use crate::{ma_crossover::MACrossover, prob_reversion::ProbReversion, supertrend::SuperTrend, Strategy};
use core_types::StrategyConfig;

/// Names accepted by [`create_strategy`].
pub const STRATEGY_NAMES: &[&str] = &["ma_crossover", "supertrend", "prob_reversion"];

/// Builds a strategy from its name and TOML parameter table.
pub fn create_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match config.name.as_str() {
        "ma_crossover" => {
            let settings: MACrossoverSettings = config.params.clone().try_into()?;
            Box::new(MACrossover::new(settings)?)
        }
        "supertrend" => {
            let settings: SuperTrendSettings = config.params.clone().try_into()?;
            Box::new(SuperTrend::new(settings)?)
        }
        "prob_reversion" => {
            let settings: ProbReversionSettings = config.params.clone().try_into()?;
            Box::new(ProbReversion::new(settings)?)
        }
        unknown => return Err(Error::UnknownStrategy(unknown.to_string())),
    };
    Ok(strategy)
}
