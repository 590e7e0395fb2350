// In crates/risk/src/types.rs

use core_types::{Kline, Side, StopReason};
use rust_decimal::Decimal;
use serde::Serialize;

/// Input to one target computation.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub side: Side,
    pub entry_price: Decimal,
    pub klines: &'a [Kline],
    /// Fixes the size instead of deriving it from allocated capital (e.g. the actual filled size).
    pub quantity: Option<Decimal>,
}

/// The initial protective levels of a new position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetPlan {
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// `Initial` or `HardCap`.
    pub stop_reason: StopReason,
    /// The strategy's suggestion before any override, for audit.
    pub strategy_stop: Option<Decimal>,
    /// Round-trip fee per unit of size.
    pub round_trip_fee: Decimal,
}

impl TargetPlan {
    pub fn risk_distance(&self) -> Decimal {
        (self.entry_price - self.stop_loss).abs()
    }

    pub fn reward_distance(&self) -> Decimal {
        (self.take_profit - self.entry_price).abs()
    }

    /// Reward over risk after charging the round-trip fee to both legs.
    pub fn net_reward_risk(&self) -> Decimal {
        let risk = self.risk_distance() + self.round_trip_fee;
        if risk.is_zero() {
            return Decimal::ZERO;
        }
        (self.reward_distance() - self.round_trip_fee) / risk
    }

    /// Loss at the stop, excluding fees.
    pub fn loss_at_stop(&self) -> Decimal {
        self.risk_distance() * self.quantity
    }
}
