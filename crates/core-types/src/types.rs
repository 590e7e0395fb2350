// In crates/core-types/src/types.rs

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trading instrument identifier (e.g., "BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol(value.to_string())
    }
}

/// The direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// `+1` for longs and `-1` for shorts, for signed price arithmetic.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => dec!(1),
            Side::Short => dec!(-1),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
        }
    }
}

/// What a strategy wants to do on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    pub fn side(self) -> Option<Side> {
        match self {
            Direction::Buy => Some(Side::Long),
            Direction::Sell => Some(Side::Short),
            Direction::Hold => None,
        }
    }
}

/// The output of a strategy evaluation.
///
/// A signal carries no sizing information; sizing belongs to the risk engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub rationale: Vec<String>,
}

impl Signal {
    pub fn hold() -> Self {
        Self {
            direction: Direction::Hold,
            rationale: Vec::new(),
        }
    }

    pub fn hold_because(reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::Hold,
            rationale: vec![reason.into()],
        }
    }

    pub fn buy(rationale: Vec<String>) -> Self {
        Self {
            direction: Direction::Buy,
            rationale,
        }
    }

    pub fn sell(rationale: Vec<String>) -> Self {
        Self {
            direction: Direction::Sell,
            rationale,
        }
    }

    pub fn for_side(side: Side, rationale: Vec<String>) -> Self {
        match side {
            Side::Long => Self::buy(rationale),
            Side::Short => Self::sell(rationale),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.direction == Direction::Hold
    }

    pub fn side(&self) -> Option<Side> {
        self.direction.side()
    }
}

/// A single OHLCV candle.
///
/// `is_final` separates a settled bar from an in-progress preview. Times are
/// unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
    #[serde(default = "default_final")]
    pub is_final: bool,
}

fn default_final() -> bool {
    true
}

/// Why the stop-loss of a position currently sits where it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Initial,
    HardCap,
    Breakeven,
    ProfitSecure(u32),
    StrategyTrail,
    AggressiveTrail,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Initial => f.write_str("initial"),
            StopReason::HardCap => f.write_str("hard-cap"),
            StopReason::Breakeven => f.write_str("breakeven"),
            StopReason::ProfitSecure(tier) => write!(f, "profit-secure-tier-{}", tier),
            StopReason::StrategyTrail => f.write_str("strategy-trail"),
            StopReason::AggressiveTrail => f.write_str("aggressive-trail"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// The strategy's own exit rule (reversal pattern, mean reached, ...).
    StrategyExit,
    /// The invalidation re-check found the entry thesis no longer holds.
    Invalidation,
    ManualStop,
    /// The venue no longer reports the position (e.g. stopped out while paused).
    VenueClosed,
    /// Local and venue state disagreed; the position was force-closed locally.
    Desync,
    EndOfReplay,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop loss",
            ExitReason::TakeProfit => "take profit",
            ExitReason::StrategyExit => "strategy exit",
            ExitReason::Invalidation => "invalidation",
            ExitReason::ManualStop => "manual stop",
            ExitReason::VenueClosed => "closed on venue",
            ExitReason::Desync => "state desync",
            ExitReason::EndOfReplay => "end of replay",
        };
        f.write_str(s)
    }
}

/// A finalized, append-only record of a closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_time: i64,
    pub exit_time: i64,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub gross_pnl: Decimal,
    pub fees: Decimal,
    /// Realized profit/loss net of modeled fees.
    pub net_pnl: Decimal,
    /// Venue-reported slippage on the exit fill, in quote currency.
    pub slippage: Decimal,
    pub exit_reason: ExitReason,
    pub stop_reason_at_exit: StopReason,
    pub entry_rationale: Vec<String>,
}

impl TradeRecord {
    pub fn entry_notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Net return on the entry notional, as a fraction.
    pub fn return_fraction(&self) -> Decimal {
        let notional = self.entry_notional();
        if notional.is_zero() {
            Decimal::ZERO
        } else {
            self.net_pnl / notional
        }
    }

    pub fn is_win(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}
