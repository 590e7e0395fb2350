// In crates/analytics/src/types.rs

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A struct to hold a point in the portfolio's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

impl EquityPoint {
    /// A point at a millisecond timestamp. Out-of-range timestamps clamp to the epoch.
    pub fn at_millis(millis: i64, value: Decimal) -> Self {
        let timestamp = Utc.timestamp_millis_opt(millis).single().unwrap_or_default();
        Self { timestamp, value }
    }
}

/// A comprehensive report of a strategy's performance over a replay window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceReport {
    // Trade counts
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    /// Trades whose net result is within one basis point of entry notional.
    pub breakevens: u32,

    // Money
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_pnl_absolute: Decimal,
    pub net_pnl_percentage: f64,
    pub expectancy: Decimal,

    // Ratios
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,

    // Drawdown
    pub max_drawdown_absolute: Decimal,
    pub max_drawdown_percentage: f64,
    pub drawdown_duration_secs: i64,

    pub avg_trade_duration_secs: f64,

    /// Trade count per exit reason.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub exit_reasons: BTreeMap<String, u32>,
}

impl PerformanceReport {
    /// Creates a new, empty report with zero values.
    pub fn new() -> Self {
        Self::default()
    }
}
