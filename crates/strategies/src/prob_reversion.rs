// In crates/strategies/src/prob_reversion.rs

use crate::error::{Error, Result};
use crate::indicators::{adx_series, bollinger_series, closes, lowest_low, rsi_series, sma_series, to_f64};
use crate::types::ProbReversionSettings;
use crate::Strategy;
use core_types::{BotConfig, Kline, Position, Side, Signal};
use rust_decimal::Decimal;

/// Indicator values needed by the reversion rules, one entry per kline.
struct Series {
    closes: Vec<f64>,
    lows: Vec<f64>,
    bands: Vec<(f64, f64, f64)>,
    rsi: Vec<f64>,
    rsi_sma: Vec<f64>,
    adx: Vec<f64>,
}

/// Long-only mean reversion in ranging markets.
///
/// A setup bar needs a ranging regime (low ADX), a low at or under the lower
/// Bollinger band and fading selling momentum (oversold RSI with a rising RSI
/// average). The following bar confirms the entry by closing above the setup close.
#[derive(Debug, Clone)]
pub struct ProbReversion {
    settings: ProbReversionSettings,
}

impl ProbReversion {
    pub fn new(settings: ProbReversionSettings) -> Result<Self> {
        if settings.bband_period < 2
            || settings.adx_period == 0
            || settings.rsi_period == 0
            || settings.rsi_smoothing == 0
            || settings.stop_lookback == 0
        {
            return Err(Error::InvalidParams {
                name: "prob_reversion".into(),
                reason: "periods must be positive (bband_period at least 2)".into(),
            });
        }
        if settings.bband_stddev <= 0.0 {
            return Err(Error::InvalidParams {
                name: "prob_reversion".into(),
                reason: "bband_stddev must be positive".into(),
            });
        }
        Ok(Self { settings })
    }

    fn series(&self, klines: &[Kline]) -> Option<Series> {
        let closes = closes(klines);
        let highs: Vec<f64> = klines.iter().map(|k| to_f64(k.high)).collect();
        let lows: Vec<f64> = klines.iter().map(|k| to_f64(k.low)).collect();
        let bands = bollinger_series(&closes, self.settings.bband_period as usize, self.settings.bband_stddev)?;
        let rsi = rsi_series(&closes, self.settings.rsi_period as usize)?;
        let rsi_sma = sma_series(&rsi, self.settings.rsi_smoothing as usize)?;
        let adx = adx_series(&highs, &lows, &closes, self.settings.adx_period as usize);
        Some(Series {
            closes,
            lows,
            bands,
            rsi,
            rsi_sma,
            adx,
        })
    }

    fn is_setup(&self, s: &Series, i: usize) -> Option<Vec<String>> {
        if i == 0 {
            return None;
        }
        // FILTER 1: Regime Filter (is market ranging?)
        if s.adx[i] >= self.settings.adx_range_threshold {
            return None;
        }
        // FILTER 2: Location Filter (is price at an extreme low?)
        let (lower, _, _) = s.bands[i];
        if s.lows[i] > lower {
            return None;
        }
        // FILTER 3: Momentum Filter (is selling pressure exhausted?)
        if s.rsi[i] >= self.settings.rsi_oversold || s.rsi_sma[i] <= s.rsi_sma[i - 1] {
            return None;
        }
        Some(vec![
            format!("ADX {:.1} below range threshold {}", s.adx[i], self.settings.adx_range_threshold),
            format!("low {:.4} tagged lower band {:.4}", s.lows[i], lower),
            format!("RSI {:.1} oversold with rising average", s.rsi[i]),
        ])
    }
}

impl Strategy for ProbReversion {
    fn name(&self) -> &'static str {
        "ProbabilisticReversion"
    }

    fn warmup_bars(&self) -> usize {
        let s = &self.settings;
        ((s.adx_period * 2 + 1)
            .max(s.bband_period)
            .max(s.rsi_period + s.rsi_smoothing)
            + 1) as usize
    }

    fn evaluate(&self, klines: &[Kline], _config: &BotConfig, _htf: Option<&[Kline]>) -> Signal {
        if klines.len() < self.warmup_bars() {
            return Signal::hold_because("warming up");
        }
        let Some(series) = self.series(klines) else {
            return Signal::hold();
        };
        let last = series.closes.len() - 1;
        let Some(mut rationale) = self.is_setup(&series, last - 1) else {
            return Signal::hold();
        };
        if series.closes[last] <= series.closes[last - 1] {
            return Signal::hold_because("setup not confirmed by a higher close");
        }
        rationale.push(format!(
            "confirmed: close {:.4} above setup close {:.4}",
            series.closes[last],
            series.closes[last - 1]
        ));
        Signal::buy(rationale)
    }

    /// Long while price has not yet reverted and the market is still ranging.
    fn bias(&self, klines: &[Kline], _config: &BotConfig, _htf: Option<&[Kline]>) -> Option<Side> {
        let series = self.series(klines)?;
        let last = series.closes.len().checked_sub(1)?;
        let (_, average, _) = series.bands[last];
        let ranging = series.adx[last] < self.settings.adx_range_threshold;
        (ranging && series.closes[last] < average).then_some(Side::Long)
    }

    fn native_stop(&self, side: Side, entry: Decimal, klines: &[Kline]) -> Option<Decimal> {
        match side {
            Side::Long => lowest_low(klines, self.settings.stop_lookback as usize).filter(|s| *s < entry),
            Side::Short => None,
        }
    }

    fn exit_signal(&self, position: &Position, klines: &[Kline]) -> Option<String> {
        if position.side != Side::Long {
            return None;
        }
        let series = self.series(klines)?;
        let last = series.closes.len().checked_sub(1)?;
        let (_, average, _) = series.bands[last];
        (series.closes[last] >= average)
            .then(|| format!("price {:.4} reverted to the mean {:.4}", series.closes[last], average))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, from_closes};

    fn strategy() -> ProbReversion {
        ProbReversion::new(ProbReversionSettings::default()).unwrap()
    }

    #[test]
    fn never_sells() {
        let pr = strategy();
        let cfg = config("prob_reversion");
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + ((i as f64) * 0.7).sin() * 4.0).collect();
        let klines = from_closes(&closes);
        for n in pr.warmup_bars()..=klines.len() {
            assert!(pr.evaluate(&klines[..n], &cfg, None).side() != Some(Side::Short));
        }
        assert!(pr.native_stop(Side::Short, Decimal::from(100), &klines).is_none());
    }

    #[test]
    fn holds_during_warmup() {
        let pr = strategy();
        let klines = from_closes(&[100.0; 10]);
        assert!(pr.evaluate(&klines, &config("prob_reversion"), None).is_hold());
    }

    #[test]
    fn swing_low_stop_is_below_entry() {
        let pr = strategy();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + ((i as f64) * 0.5).cos()).collect();
        let klines = from_closes(&closes);
        let entry = klines.last().unwrap().close;
        let stop = pr.native_stop(Side::Long, entry, &klines).unwrap();
        assert!(stop < entry);
    }
}
