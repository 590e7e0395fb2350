// In crates/strategies/src/supertrend.rs

use crate::error::{Error, Result};
use crate::indicators::{atr_series, closes, ema_series, to_decimal, to_f64};
use crate::types::SuperTrendSettings;
use crate::Strategy;
use core_types::{BotConfig, Kline, Position, Side, Signal};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;

// --- Internal State and Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum TrendDirection {
    #[default]
    Sideways,
    Uptrend,
    Downtrend,
}

impl TrendDirection {
    fn side(self) -> Option<Side> {
        match self {
            TrendDirection::Uptrend => Some(Side::Long),
            TrendDirection::Downtrend => Some(Side::Short),
            TrendDirection::Sideways => None,
        }
    }
}

/// Calculation state for a single bar.
#[derive(Debug, Clone, Copy, Default)]
struct StState {
    atr: f64,
    final_upper_band: f64,
    final_lower_band: f64,
    trend: TrendDirection,
    /// Consecutive bars the current trend has held, including this one.
    run_length: u32,
}

/// The Enhanced SuperTrend strategy: ATR bands with trend confirmation,
/// an EMA filter and a tighter exit band.
#[derive(Debug, Clone)]
pub struct SuperTrend {
    settings: SuperTrendSettings,
}

impl SuperTrend {
    pub fn new(settings: SuperTrendSettings) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidParams {
            name: "supertrend".into(),
            reason: reason.into(),
        };
        if settings.period < 1 || settings.confirmation_bars < 1 || settings.ema_confirmation_period < 1 {
            return Err(invalid("periods must be greater than 0"));
        }
        if settings.multiplier <= 0.0 || settings.exit_multiplier <= 0.0 {
            return Err(invalid("multipliers must be positive"));
        }
        Ok(Self { settings })
    }

    /// Recomputes the band history from scratch for the given klines.
    fn states(&self, klines: &[Kline]) -> Option<Vec<StState>> {
        let atr = atr_series(klines, self.settings.period as usize)?;
        let mut states = Vec::with_capacity(klines.len());
        let mut last = StState::default();

        for (i, kline) in klines.iter().enumerate() {
            let close = to_f64(kline.close);
            let high = to_f64(kline.high);
            let low = to_f64(kline.low);
            let prev_close = if i > 0 { to_f64(klines[i - 1].close) } else { close };
            let hl2 = (high + low) / 2.0;

            let basic_upper = hl2 + self.settings.multiplier * atr[i];
            let basic_lower = hl2 - self.settings.multiplier * atr[i];

            let mut current = last;
            current.atr = atr[i];
            current.final_upper_band = if i == 0
                || basic_upper < last.final_upper_band
                || prev_close > last.final_upper_band
            {
                basic_upper
            } else {
                last.final_upper_band
            };
            current.final_lower_band = if i == 0
                || basic_lower > last.final_lower_band
                || prev_close < last.final_lower_band
            {
                basic_lower
            } else {
                last.final_lower_band
            };

            current.trend = if close > last.final_upper_band && i > 0 {
                TrendDirection::Uptrend
            } else if close < last.final_lower_band && i > 0 {
                TrendDirection::Downtrend
            } else {
                last.trend
            };
            current.run_length = if current.trend == last.trend && i > 0 {
                last.run_length + 1
            } else {
                1
            };

            states.push(current);
            last = current;
        }
        Some(states)
    }

    fn trend_of(&self, klines: &[Kline]) -> Option<TrendDirection> {
        if klines.len() < self.settings.period as usize + 1 {
            return None;
        }
        self.states(klines)?.last().map(|s| s.trend)
    }
}

impl Strategy for SuperTrend {
    fn name(&self) -> &'static str {
        "EnhancedSuperTrend"
    }

    fn warmup_bars(&self) -> usize {
        (self.settings.period as usize).max(self.settings.ema_confirmation_period as usize)
            + self.settings.confirmation_bars as usize
    }

    fn evaluate(&self, klines: &[Kline], config: &BotConfig, htf: Option<&[Kline]>) -> Signal {
        if klines.len() < self.warmup_bars() {
            return Signal::hold_because("warming up");
        }
        let Some(states) = self.states(klines) else {
            return Signal::hold();
        };
        let Some(current) = states.last() else {
            return Signal::hold();
        };
        let Some(current_kline) = klines.last() else {
            return Signal::hold();
        };

        // Volume Filter
        let volume_threshold = Decimal::from_f64(self.settings.volume_threshold).unwrap_or_default();
        if current_kline.volume < volume_threshold {
            return Signal::hold_because("volume below threshold");
        }

        // Fires on the bar the new trend completes its confirmation run.
        if current.run_length != self.settings.confirmation_bars {
            return Signal::hold();
        }
        let Some(side) = current.trend.side() else {
            return Signal::hold();
        };

        let period = self.settings.ema_confirmation_period as usize;
        let Some(ema) = ema_series(&closes(klines), period).and_then(|v| v.last().copied()) else {
            return Signal::hold();
        };
        let close = to_f64(current_kline.close);
        let ema_agrees = match side {
            Side::Long => close > ema,
            Side::Short => close < ema,
        };
        if !ema_agrees {
            return Signal::hold_because(format!("close {:.4} on wrong side of EMA({})", close, period));
        }

        let mut rationale = vec![
            format!(
                "SuperTrend({}, {}) confirmed {} over {} bar(s)",
                self.settings.period, self.settings.multiplier, side, current.run_length
            ),
            format!("close {:.4} vs EMA({}) {:.4}", close, period, ema),
        ];

        if config.htf_interval().is_some() {
            match htf.and_then(|bars| self.trend_of(bars)) {
                Some(trend) if trend.side() == Some(side) => {
                    rationale.push(format!("higher timeframe trend agrees ({})", side));
                }
                Some(_) => return Signal::hold_because("higher timeframe trend disagrees"),
                None => return Signal::hold_because("higher timeframe history unavailable"),
            }
        }

        Signal::for_side(side, rationale)
    }

    fn bias(&self, klines: &[Kline], _config: &BotConfig, _htf: Option<&[Kline]>) -> Option<Side> {
        self.trend_of(klines)?.side()
    }

    fn native_stop(&self, side: Side, entry: Decimal, klines: &[Kline]) -> Option<Decimal> {
        let last = *self.states(klines)?.last()?;
        match side {
            Side::Long => to_decimal(last.final_lower_band).filter(|s| *s < entry),
            Side::Short => to_decimal(last.final_upper_band).filter(|s| *s > entry),
        }
    }

    fn native_trailing_stop(
        &self,
        position: &Position,
        klines: &[Kline],
        _config: &BotConfig,
    ) -> Option<Decimal> {
        let last = *self.states(klines)?.last()?;
        match (position.side, last.trend) {
            (Side::Long, TrendDirection::Uptrend) => to_decimal(last.final_lower_band),
            (Side::Short, TrendDirection::Downtrend) => to_decimal(last.final_upper_band),
            _ => None,
        }
    }

    fn exit_signal(&self, position: &Position, klines: &[Kline]) -> Option<String> {
        let last = *self.states(klines)?.last()?;
        let kline = klines.last()?;
        let hl2 = (kline.high + kline.low) / Decimal::TWO;
        let exit_atr = to_decimal(last.atr)?;
        let exit_multiplier = Decimal::from_f64(self.settings.exit_multiplier)?;
        let exit_upper = hl2 + exit_multiplier * exit_atr;
        let exit_lower = hl2 - exit_multiplier * exit_atr;

        match position.side {
            Side::Long if kline.close < exit_lower => {
                Some(format!("close {} fell through exit band {}", kline.close, exit_lower.round_dp(4)))
            }
            Side::Short if kline.close > exit_upper => {
                Some(format!("close {} rose through exit band {}", kline.close, exit_upper.round_dp(4)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, from_closes, rising_klines};
    use core_types::Direction;

    fn strategy() -> SuperTrend {
        SuperTrend::new(SuperTrendSettings {
            period: 5,
            multiplier: 1.0,
            ema_confirmation_period: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn down_then_up() -> Vec<Kline> {
        let mut closes: Vec<f64> = (0..30).map(|i| 130.0 - i as f64).collect();
        closes.extend((0..15).map(|i| 101.0 + 2.0 * i as f64));
        from_closes(&closes)
    }

    #[test]
    fn rejects_non_positive_settings() {
        let bad = SuperTrendSettings {
            multiplier: 0.0,
            ..Default::default()
        };
        assert!(SuperTrend::new(bad).is_err());
    }

    #[test]
    fn buys_once_on_the_flip_to_uptrend() {
        let st = strategy();
        let cfg = config("supertrend");
        let klines = down_then_up();
        let buys: Vec<usize> = (st.warmup_bars()..=klines.len())
            .filter(|n| st.evaluate(&klines[..*n], &cfg, None).direction == Direction::Buy)
            .collect();
        assert_eq!(buys.len(), 1, "expected exactly one buy, got {:?}", buys);
        assert_eq!(st.bias(&klines, &cfg, None), Some(Side::Long));
    }

    #[test]
    fn evaluation_is_pure() {
        let st = strategy();
        let cfg = config("supertrend");
        let klines = down_then_up();
        assert_eq!(st.evaluate(&klines, &cfg, None), st.evaluate(&klines, &cfg, None));
    }

    #[test]
    fn native_stop_sits_below_a_long_entry() {
        let st = strategy();
        let klines = rising_klines(30, 100.0, 1.0);
        let entry = klines.last().unwrap().close;
        let stop = st.native_stop(Side::Long, entry, &klines).unwrap();
        assert!(stop < entry);
        if let Some(short_stop) = st.native_stop(Side::Short, entry, &klines) {
            assert!(short_stop > entry);
        }
    }

    #[test]
    fn htf_disagreement_blocks_entry() {
        let st = strategy();
        let mut cfg = config("supertrend");
        cfg.features.htf_confirmation = true;
        cfg.features.htf_interval = Some(core_types::Interval::H1);
        let klines = down_then_up();
        let falling: Vec<f64> = (0..30).map(|i| 200.0 - 2.0 * i as f64).collect();
        let htf = from_closes(&falling);

        let n = (st.warmup_bars()..=klines.len())
            .find(|n| st.evaluate(&klines[..*n], &config("supertrend"), None).direction == Direction::Buy)
            .unwrap();
        assert!(st.evaluate(&klines[..n], &cfg, Some(&htf)).is_hold());
        assert!(st.evaluate(&klines[..n], &cfg, None).is_hold());
    }
}
