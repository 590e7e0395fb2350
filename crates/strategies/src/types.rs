// In crates/strategies/src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MACrossoverSettings {
    // Entry crossover on the bot's own interval
    pub fast_period: u32,
    pub slow_period: u32,

    // Regime filter, evaluated on the higher timeframe when confirmation is enabled
    pub regime_fast_period: u32,
    pub regime_slow_period: u32,

    pub atr_period: u32,
    pub atr_stop_multiplier: f64,
}

impl Default for MACrossoverSettings {
    fn default() -> Self {
        Self {
            fast_period: 9,
            slow_period: 21,
            regime_fast_period: 20,
            regime_slow_period: 50,
            atr_period: 14,
            atr_stop_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)] // Clone is needed for the optimizer
#[serde(default)]
pub struct SuperTrendSettings {
    pub period: u32,
    pub multiplier: f64,
    pub exit_multiplier: f64,
    pub volume_threshold: f64,
    pub confirmation_bars: u32,
    pub ema_confirmation_period: u32,
}

impl Default for SuperTrendSettings {
    fn default() -> Self {
        Self {
            period: 10,
            multiplier: 3.0,
            exit_multiplier: 1.5,
            volume_threshold: 0.0,
            confirmation_bars: 1,
            ema_confirmation_period: 20,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbReversionSettings {
    pub bband_period: u32,
    pub bband_stddev: f64,
    pub adx_period: u32,
    pub adx_range_threshold: f64,
    pub rsi_period: u32,
    pub rsi_oversold: f64,
    pub rsi_smoothing: u32,
    /// Bars scanned for the swing low used as the native stop.
    pub stop_lookback: u32,
}

impl Default for ProbReversionSettings {
    fn default() -> Self {
        Self {
            bband_period: 20,
            bband_stddev: 2.0,
            adx_period: 14,
            adx_range_threshold: 25.0,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_smoothing: 3,
            stop_lookback: 10,
        }
    }
}
