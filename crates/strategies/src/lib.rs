// In crates/strategies/src/lib.rs

use core_types::{BotConfig, Kline, Position, Side, Signal};
use rust_decimal::Decimal;

pub mod error;
pub mod factory;
pub mod indicators;
pub mod ma_crossover;
pub mod prob_reversion;
pub mod supertrend;
pub mod types;

pub use error::{Error, Result};
pub use factory::create_strategy;

const EXHAUSTION_RSI_PERIOD: usize = 14;
const EXHAUSTION_RSI_HIGH: f64 = 70.0;
const EXHAUSTION_RSI_LOW: f64 = 30.0;

/// The universal interface for a trading strategy.
///
/// Strategies are pure: every method is a function of its arguments only, so the
/// same klines always produce the same answer. Live trading and replay rely on this.
pub trait Strategy: Send + Sync {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    /// Minimum number of native klines needed before `evaluate` can produce a trade.
    fn warmup_bars(&self) -> usize;

    /// Entry decision on the latest kline of `klines`.
    fn evaluate(&self, klines: &[Kline], config: &BotConfig, htf: Option<&[Kline]>) -> Signal;

    /// The side the strategy currently favours, regardless of whether an entry
    /// trigger fired. Used to decide whether an open position's thesis still holds.
    fn bias(&self, klines: &[Kline], config: &BotConfig, htf: Option<&[Kline]>) -> Option<Side>;

    /// The strategy's own stop suggestion for a fresh entry.
    fn native_stop(&self, side: Side, entry: Decimal, klines: &[Kline]) -> Option<Decimal>;

    /// The strategy's own trailing level for an open position.
    fn native_trailing_stop(
        &self,
        _position: &Position,
        _klines: &[Kline],
        _config: &BotConfig,
    ) -> Option<Decimal> {
        None
    }

    /// A reason to close the position right now, if the strategy has one.
    fn exit_signal(&self, _position: &Position, _klines: &[Kline]) -> Option<String> {
        None
    }

    /// Vetoes re-entering `side` when the move already looks extended.
    fn exhaustion_veto(&self, side: Side, klines: &[Kline]) -> Option<String> {
        let rsi = indicators::rsi_series(&indicators::closes(klines), EXHAUSTION_RSI_PERIOD)?;
        let last = *rsi.last()?;
        match side {
            Side::Long if last >= EXHAUSTION_RSI_HIGH => {
                Some(format!("RSI {:.1} overbought, long move looks exhausted", last))
            }
            Side::Short if last <= EXHAUSTION_RSI_LOW => {
                Some(format!("RSI {:.1} oversold, short move looks exhausted", last))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use core_types::{BotConfig, Kline, StrategyConfig};
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    pub fn kline(i: usize, open: f64, high: f64, low: f64, close: f64) -> Kline {
        let d = |v: f64| Decimal::from_f64(v).unwrap().round_dp(4);
        Kline {
            open_time: i as i64 * 60_000,
            open: d(open),
            high: d(high),
            low: d(low),
            close: d(close),
            volume: Decimal::from(100),
            close_time: i as i64 * 60_000 + 59_999,
            is_final: true,
        }
    }

    /// Klines from a list of closes, each bar spanning half a unit either side.
    pub fn from_closes(closes: &[f64]) -> Vec<Kline> {
        let mut prev = closes.first().copied().unwrap_or(100.0);
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let k = kline(i, prev, prev.max(*c) + 0.5, prev.min(*c) - 0.5, *c);
                prev = *c;
                k
            })
            .collect()
    }

    pub fn rising_klines(n: usize, start: f64, step: f64) -> Vec<Kline> {
        let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
        from_closes(&closes)
    }

    pub fn config(name: &str) -> BotConfig {
        BotConfig {
            symbol: "BTCUSDT".into(),
            interval: core_types::Interval::M1,
            strategy: StrategyConfig::new(name, toml::Value::Table(Default::default())),
            allocated_capital: Decimal::from(1000),
            leverage: 1,
            mode: Default::default(),
            features: Default::default(),
            fee_rate: Decimal::new(4, 4),
            precision: Default::default(),
            risk: Default::default(),
            management: Default::default(),
            lifecycle: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rising_klines;
    use crate::types::SuperTrendSettings;

    #[test]
    fn default_exhaustion_veto_blocks_chasing_an_extended_move() {
        let st = supertrend::SuperTrend::new(SuperTrendSettings::default()).unwrap();
        let klines = rising_klines(40, 100.0, 1.0);
        assert!(st.exhaustion_veto(Side::Long, &klines).is_some());
        assert!(st.exhaustion_veto(Side::Short, &klines).is_none());
    }
}
