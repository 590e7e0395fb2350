// In crates/strategies/src/ma_crossover.rs

use crate::error::{Error, Result};
use crate::indicators::{atr_series, closes, ema_series, to_decimal};
use crate::types::MACrossoverSettings;
use crate::Strategy;
use core_types::{BotConfig, Kline, Position, Side, Signal};
use rust_decimal::Decimal;

// Market regime read from the higher timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MarketRegime {
    #[default]
    Sideways,
    Bullish,
    Bearish,
}

impl MarketRegime {
    fn allows(self, side: Side) -> bool {
        matches!(
            (self, side),
            (MarketRegime::Bullish, Side::Long) | (MarketRegime::Bearish, Side::Short)
        )
    }
}

/// Multi-timeframe EMA crossover: the entry timeframe supplies the crossover,
/// the higher timeframe (when enabled) supplies the regime filter.
#[derive(Debug, Clone)]
pub struct MACrossover {
    settings: MACrossoverSettings,
}

impl MACrossover {
    pub fn new(settings: MACrossoverSettings) -> Result<Self> {
        if settings.fast_period == 0 || settings.fast_period >= settings.slow_period {
            return Err(Error::InvalidParams {
                name: "ma_crossover".into(),
                reason: "fast_period must be positive and below slow_period".into(),
            });
        }
        if settings.regime_fast_period == 0 || settings.regime_fast_period >= settings.regime_slow_period {
            return Err(Error::InvalidParams {
                name: "ma_crossover".into(),
                reason: "regime_fast_period must be positive and below regime_slow_period".into(),
            });
        }
        if settings.atr_period == 0 || settings.atr_stop_multiplier <= 0.0 {
            return Err(Error::InvalidParams {
                name: "ma_crossover".into(),
                reason: "atr_period and atr_stop_multiplier must be positive".into(),
            });
        }
        Ok(Self { settings })
    }

    /// Fast and slow EMA for the last two bars: `((fast_prev, slow_prev), (fast, slow))`.
    fn last_two(&self, klines: &[Kline]) -> Option<((f64, f64), (f64, f64))> {
        let values = closes(klines);
        let fast = ema_series(&values, self.settings.fast_period as usize)?;
        let slow = ema_series(&values, self.settings.slow_period as usize)?;
        let n = values.len();
        if n < 2 {
            return None;
        }
        Some(((fast[n - 2], slow[n - 2]), (fast[n - 1], slow[n - 1])))
    }

    pub fn regime(&self, htf: &[Kline]) -> Option<MarketRegime> {
        let values = closes(htf);
        let fast = *ema_series(&values, self.settings.regime_fast_period as usize)?.last()?;
        let slow = *ema_series(&values, self.settings.regime_slow_period as usize)?.last()?;
        Some(if fast > slow {
            MarketRegime::Bullish
        } else if fast < slow {
            MarketRegime::Bearish
        } else {
            MarketRegime::Sideways
        })
    }
}

impl Strategy for MACrossover {
    fn name(&self) -> &'static str {
        "MultiTimeframeMACrossover"
    }

    fn warmup_bars(&self) -> usize {
        (self.settings.slow_period as usize).max(self.settings.atr_period as usize) + 1
    }

    fn evaluate(&self, klines: &[Kline], config: &BotConfig, htf: Option<&[Kline]>) -> Signal {
        if klines.len() < self.warmup_bars() {
            return Signal::hold_because("warming up");
        }
        let Some(((prev_fast, prev_slow), (fast, slow))) = self.last_two(klines) else {
            return Signal::hold();
        };

        let side = if fast > slow && prev_fast <= prev_slow {
            Side::Long
        } else if fast < slow && prev_fast >= prev_slow {
            Side::Short
        } else {
            return Signal::hold();
        };

        let mut rationale = vec![format!(
            "EMA({}) {:.4} crossed {} EMA({}) {:.4}",
            self.settings.fast_period,
            fast,
            if side == Side::Long { "above" } else { "below" },
            self.settings.slow_period,
            slow
        )];

        if config.htf_interval().is_some() {
            match htf.and_then(|bars| self.regime(bars)) {
                Some(regime) if regime.allows(side) => {
                    rationale.push(format!("higher timeframe regime {:?}", regime));
                }
                Some(regime) => {
                    return Signal::hold_because(format!("{} crossover against {:?} regime", side, regime));
                }
                None => return Signal::hold_because("higher timeframe history unavailable"),
            }
        }

        Signal::for_side(side, rationale)
    }

    fn bias(&self, klines: &[Kline], config: &BotConfig, htf: Option<&[Kline]>) -> Option<Side> {
        let (_, (fast, slow)) = self.last_two(klines)?;
        let side = if fast > slow {
            Side::Long
        } else if fast < slow {
            Side::Short
        } else {
            return None;
        };
        if config.htf_interval().is_some() {
            if let Some(regime) = htf.and_then(|bars| self.regime(bars)) {
                if !regime.allows(side) {
                    return None;
                }
            }
        }
        Some(side)
    }

    fn native_stop(&self, side: Side, entry: Decimal, klines: &[Kline]) -> Option<Decimal> {
        let atr = to_decimal(*atr_series(klines, self.settings.atr_period as usize)?.last()?)?;
        let multiplier = to_decimal(self.settings.atr_stop_multiplier)?;
        let stop = entry - side.sign() * atr * multiplier;
        (stop > Decimal::ZERO).then_some(stop)
    }

    /// Trails at the slow EMA while it sits on the protective side.
    fn native_trailing_stop(
        &self,
        position: &Position,
        klines: &[Kline],
        _config: &BotConfig,
    ) -> Option<Decimal> {
        let (_, (_, slow)) = self.last_two(klines)?;
        let level = to_decimal(slow)?;
        let close = klines.last()?.close;
        match position.side {
            Side::Long if level < close => Some(level),
            Side::Short if level > close => Some(level),
            _ => None,
        }
    }

    fn exit_signal(&self, position: &Position, klines: &[Kline]) -> Option<String> {
        let ((prev_fast, prev_slow), (fast, slow)) = self.last_two(klines)?;
        match position.side {
            Side::Long if fast < slow && prev_fast >= prev_slow => {
                Some("fast EMA crossed back below slow EMA".into())
            }
            Side::Short if fast > slow && prev_fast <= prev_slow => {
                Some("fast EMA crossed back above slow EMA".into())
            }
            _ => None,
        }
    }
}
