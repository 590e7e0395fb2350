// In crates/core-types/src/config.rs

use crate::error::{Error, Result};
use crate::interval::Interval;
use crate::precision::PrecisionRules;
use crate::strategy::StrategyConfig;
use crate::types::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Whether a bot trades against the simulated portfolio or the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Simulated,
    Live,
}

/// When a closed trade puts the bot into cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    Never,
    #[default]
    AfterLoss,
    Always,
}

/// The immutable configuration snapshot of one bot.
///
/// Edits mid-run replace the whole snapshot; nothing mutates it field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub symbol: Symbol,
    pub interval: Interval,
    pub strategy: StrategyConfig,
    /// Capital allocated to this bot's position, in quote currency.
    pub allocated_capital: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u8,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default)]
    pub features: FeatureToggles,
    /// Fraction of notional charged per fill side.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default)]
    pub precision: PrecisionRules,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub management: ManagementSettings,
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub htf_confirmation: bool,
    pub htf_interval: Option<Interval>,
    pub invalidation_recheck: bool,
    /// Enables the aggressive range trail for every strategy.
    pub universal_profit_trail: bool,
    /// Minimum net-of-fee reward/risk ratio required to enter. `None` disables the check.
    pub min_risk_reward: Option<Decimal>,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            htf_confirmation: false,
            htf_interval: None,
            invalidation_recheck: true,
            universal_profit_trail: true,
            min_risk_reward: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Maximum loss at the initial stop, as a fraction of allocated capital.
    pub max_loss_fraction: Decimal,
    /// Minimum stop distance, as a fraction of the entry price.
    pub min_stop_distance_pct: Decimal,
    /// Overrides the interval's default reward multiple.
    pub reward_multiple: Option<Decimal>,
    /// The target must clear this many round-trip fees.
    pub fee_floor_multiple: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_loss_fraction: dec!(0.02),
            min_stop_distance_pct: dec!(0.005),
            reward_multiple: None,
            fee_floor_multiple: dec!(3),
        }
    }
}

/// Thresholds of the trade manager, all expressed in round-trip fee multiples
/// or in fractions of the stop-to-target range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementSettings {
    pub breakeven_fee_multiple: Decimal,
    pub secure_start_multiple: u32,
    pub aggressive_trigger_fraction: Decimal,
    pub aggressive_trail_fraction: Decimal,
}

impl Default for ManagementSettings {
    fn default() -> Self {
        Self {
            breakeven_fee_multiple: dec!(3),
            secure_start_multiple: 4,
            aggressive_trigger_fraction: dec!(0.5),
            aggressive_trail_fraction: dec!(0.25),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub cooldown_bars: u32,
    pub cooldown_policy: CooldownPolicy,
    /// Bars in a position before an underwater trade is re-checked.
    pub recheck_after_bars: u32,
    /// Re-arm the invalidation re-check after this many bars even without a return to profit.
    pub recheck_rearm_bars: Option<u32>,
    pub exhaustion_veto: bool,
    /// Capacity of each kline history kept by the orchestrator.
    pub history_size: usize,
    /// Interval of the exit-fidelity series.
    pub fine_interval: Interval,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            cooldown_bars: 1,
            cooldown_policy: CooldownPolicy::AfterLoss,
            recheck_after_bars: 5,
            recheck_rearm_bars: None,
            exhaustion_veto: true,
            history_size: 300,
            fine_interval: Interval::M1,
        }
    }
}

fn default_leverage() -> u8 {
    1
}

fn default_fee_rate() -> Decimal {
    dec!(0.0004)
}

impl BotConfig {
    /// A stable identifier: `{symbol}_{interval}_{strategy}`.
    pub fn bot_id(&self) -> String {
        format!("{}_{}_{}", self.symbol, self.interval, self.strategy.name)
    }

    pub fn effective_reward_multiple(&self) -> Decimal {
        self.risk
            .reward_multiple
            .unwrap_or_else(|| self.interval.default_reward_multiple())
    }

    /// The HTF series is only relevant when confirmation is enabled and an interval is set.
    pub fn htf_interval(&self) -> Option<Interval> {
        if self.features.htf_confirmation {
            self.features.htf_interval
        } else {
            None
        }
    }

    pub fn cooldown_ms(&self) -> i64 {
        i64::from(self.lifecycle.cooldown_bars) * self.interval.duration_ms()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(format!("{}: {}", self.bot_id(), msg)));

        if self.allocated_capital <= Decimal::ZERO {
            return invalid("allocated_capital must be positive");
        }
        if self.leverage == 0 {
            return invalid("leverage must be at least 1");
        }
        if self.fee_rate < Decimal::ZERO || self.fee_rate >= dec!(0.1) {
            return invalid("fee_rate must be within [0, 0.1)");
        }
        if self.precision.tick_size <= Decimal::ZERO || self.precision.step_size <= Decimal::ZERO {
            return invalid("tick_size and step_size must be positive");
        }
        if self.risk.max_loss_fraction <= Decimal::ZERO || self.risk.max_loss_fraction > Decimal::ONE {
            return invalid("max_loss_fraction must be within (0, 1]");
        }
        if self.risk.min_stop_distance_pct <= Decimal::ZERO
            || self.risk.min_stop_distance_pct >= Decimal::ONE
        {
            return invalid("min_stop_distance_pct must be within (0, 1)");
        }
        if self.effective_reward_multiple() <= Decimal::ZERO {
            return invalid("reward_multiple must be positive");
        }
        let m = &self.management;
        if m.aggressive_trigger_fraction <= Decimal::ZERO
            || m.aggressive_trigger_fraction >= Decimal::ONE
            || m.aggressive_trail_fraction <= Decimal::ZERO
            || m.aggressive_trail_fraction >= Decimal::ONE
        {
            return invalid("aggressive trail fractions must be within (0, 1)");
        }
        if self.features.htf_confirmation && self.features.htf_interval.is_none() {
            return invalid("htf_confirmation requires htf_interval");
        }
        if self.lifecycle.fine_interval.duration_ms() > self.interval.duration_ms() {
            return invalid("fine_interval must not be coarser than the bot interval");
        }
        if let Some(htf) = self.htf_interval() {
            // Bars of a shared interval are routed to the native or fine history.
            if htf.duration_ms() <= self.interval.duration_ms() {
                return invalid("htf_interval must be coarser than the bot interval");
            }
        }
        if self.lifecycle.history_size == 0 {
            return invalid("history_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        symbol = "BTCUSDT"
        interval = "1h"
        allocated_capital = 1000.0

        [strategy]
        name = "supertrend"
        params = { period = 10, multiplier = 3.0 }
    "#;

    #[test]
    fn minimal_toml_bot_fills_defaults() {
        let cfg: BotConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.leverage, 1);
        assert_eq!(cfg.mode, ExecutionMode::Simulated);
        assert_eq!(cfg.fee_rate, dec!(0.0004));
        assert_eq!(cfg.risk.max_loss_fraction, dec!(0.02));
        assert_eq!(cfg.management.secure_start_multiple, 4);
        assert_eq!(cfg.lifecycle.cooldown_policy, CooldownPolicy::AfterLoss);
        assert_eq!(cfg.bot_id(), "BTCUSDT_1h_supertrend");
        assert_eq!(cfg.effective_reward_multiple(), dec!(3.0));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn cooldown_scales_with_interval() {
        let mut cfg: BotConfig = toml::from_str(MINIMAL).unwrap();
        cfg.lifecycle.cooldown_bars = 3;
        assert_eq!(cfg.cooldown_ms(), 3 * 3_600_000);
        cfg.interval = Interval::M5;
        assert_eq!(cfg.cooldown_ms(), 3 * 300_000);
    }

    #[test]
    fn validate_rejects_htf_without_interval() {
        let mut cfg: BotConfig = toml::from_str(MINIMAL).unwrap();
        cfg.features.htf_confirmation = true;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
        cfg.features.htf_interval = Some(Interval::H4);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.htf_interval(), Some(Interval::H4));
    }

    #[test]
    fn validate_rejects_htf_not_coarser_than_the_bot_interval() {
        let mut cfg: BotConfig = toml::from_str(MINIMAL).unwrap();
        cfg.features.htf_confirmation = true;
        for htf in [cfg.interval, cfg.lifecycle.fine_interval, Interval::M15] {
            cfg.features.htf_interval = Some(htf);
            assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))), "{} accepted", htf);
        }
        cfg.features.htf_interval = Some(Interval::D1);
        assert!(cfg.validate().is_ok());
    }
}
