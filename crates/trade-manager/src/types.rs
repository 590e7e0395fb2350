// In crates/trade-manager/src/types.rs

use core_types::{Kline, StopReason};
use rust_decimal::Decimal;
use serde::Serialize;

/// The market data a management evaluation sees: the latest price plus the
/// range traded since the previous evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketView {
    pub price: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl MarketView {
    /// A single traded price (a live tick).
    pub fn at(price: Decimal) -> Self {
        Self {
            price,
            high: price,
            low: price,
        }
    }

    /// A management-resolution bar, evaluated at its close.
    pub fn from_kline(kline: &Kline) -> Self {
        Self {
            price: kline.close,
            high: kline.high,
            low: kline.low,
        }
    }
}

/// A stop proposed by one rule of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopCandidate {
    pub price: Decimal,
    pub reason: StopReason,
}

/// The outcome of one management evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Verdict {
    /// Nothing improved.
    Hold,
    /// The stop moved; `from` is the previous level.
    Tightened {
        from: Decimal,
        to: Decimal,
        reason: StopReason,
    },
    /// The strategy wants out. Takes precedence over any stop change.
    Close { reason: String },
}
