// In crates/strategies/src/indicators.rs

//! Batch indicator helpers over kline slices.
//!
//! Every helper builds fresh `ta` indicators per call, so strategies stay pure
//! functions of the klines they are given.

use core_types::Kline;
use num_traits::cast::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage as Ema,
    RelativeStrengthIndex as Rsi, SimpleMovingAverage as Sma,
};
use ta::{DataItem, Next};

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub fn to_decimal(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

pub fn closes(klines: &[Kline]) -> Vec<f64> {
    klines.iter().map(|k| to_f64(k.close)).collect()
}

pub fn ema_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut ema = Ema::new(period).ok()?;
    Some(values.iter().map(|v| ema.next(*v)).collect())
}

pub fn sma_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut sma = Sma::new(period).ok()?;
    Some(values.iter().map(|v| sma.next(*v)).collect())
}

pub fn rsi_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() <= period {
        return None;
    }
    let mut rsi = Rsi::new(period).ok()?;
    Some(values.iter().map(|v| rsi.next(*v)).collect())
}

pub fn atr_series(klines: &[Kline], period: usize) -> Option<Vec<f64>> {
    if period == 0 || klines.len() < period {
        return None;
    }
    let mut atr = AverageTrueRange::new(period).ok()?;
    let mut out = Vec::with_capacity(klines.len());
    for kline in klines {
        let close = to_f64(kline.close);
        let item = DataItem::builder()
            .open(to_f64(kline.open))
            .high(to_f64(kline.high))
            .low(to_f64(kline.low))
            .close(close)
            .volume(to_f64(kline.volume))
            .build()
            .ok()?;
        out.push(atr.next(&item));
    }
    Some(out)
}

/// Bollinger bands per bar as `(lower, average, upper)`.
pub fn bollinger_series(
    values: &[f64],
    period: usize,
    stddev: f64,
) -> Option<Vec<(f64, f64, f64)>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut bb = BollingerBands::new(period, stddev).ok()?;
    Some(
        values
            .iter()
            .map(|v| {
                let out = bb.next(*v);
                (out.lower, out.average, out.upper)
            })
            .collect(),
    )
}

/// ADX with Wilder's smoothing. Entries before `2 * period` are zero.
pub fn adx_series(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = highs.len();
    let mut adx = vec![0.0; n];
    if period == 0 || n <= period * 2 || lows.len() != n || closes.len() != n {
        return adx;
    }

    let mut tr = vec![0.0; n];
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm[i] = if up > 0.0 && up > down { up } else { 0.0 };
        minus_dm[i] = if down > 0.0 && down > up { down } else { 0.0 };
        tr[i] = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
    }

    let p = period as f64;
    let mut atr = tr[1..=period].iter().sum::<f64>() / p;
    let mut plus = plus_dm[1..=period].iter().sum::<f64>() / p;
    let mut minus = minus_dm[1..=period].iter().sum::<f64>() / p;
    let mut dx = vec![0.0; n];
    for i in period..n {
        if i > period {
            atr = (atr * (p - 1.0) + tr[i]) / p;
            plus = (plus * (p - 1.0) + plus_dm[i]) / p;
            minus = (minus * (p - 1.0) + minus_dm[i]) / p;
        }
        let (plus_di, minus_di) = if atr != 0.0 {
            (100.0 * plus / atr, 100.0 * minus / atr)
        } else {
            (0.0, 0.0)
        };
        let denom = plus_di + minus_di;
        dx[i] = if denom != 0.0 {
            100.0 * (plus_di - minus_di).abs() / denom
        } else {
            0.0
        };
    }

    adx[period * 2] = dx[period..=period * 2].iter().sum::<f64>() / p;
    for i in period * 2 + 1..n {
        adx[i] = (adx[i - 1] * (p - 1.0) + dx[i]) / p;
    }
    adx
}

pub fn lowest_low(klines: &[Kline], lookback: usize) -> Option<Decimal> {
    let start = klines.len().saturating_sub(lookback);
    klines[start..].iter().map(|k| k.low).min()
}

pub fn highest_high(klines: &[Kline], lookback: usize) -> Option<Decimal> {
    let start = klines.len().saturating_sub(lookback);
    klines[start..].iter().map(|k| k.high).max()
}
