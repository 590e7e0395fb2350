// In crates/core-types/src/position.rs

use crate::error::{Error, Result};
use crate::fees;
use crate::types::{ExitReason, Side, StopReason, Symbol, TradeRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything needed to open a position once the entry has been filled.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: i64,
    pub quantity: Decimal,
    pub leverage: u8,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub stop_reason: StopReason,
    /// The strategy's own stop before the minimum-distance and hard-cap rules.
    pub strategy_stop: Option<Decimal>,
    pub fee_rate: Decimal,
    pub entry_rationale: Vec<String>,
}

/// An open directional position and its management state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: i64,
    pub quantity: Decimal,
    pub leverage: u8,

    // --- Targets ---
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub stop_reason: StopReason,
    pub initial_stop: Decimal,
    pub strategy_stop: Option<Decimal>,

    // --- Management state ---
    /// Best price reached in the position's favor (highest for longs, lowest for shorts).
    pub favorable_extreme: Decimal,
    pub breakeven_set: bool,
    pub ever_profitable: bool,
    pub bars_since_entry: u32,
    pub loss_recheck_fired: bool,
    pub last_recheck_bar: Option<u32>,
    /// Highest profit-securing tier adopted so far.
    pub secured_tier: u32,

    // --- Fees & audit ---
    pub fee_rate: Decimal,
    pub entry_fee: Decimal,
    pub entry_rationale: Vec<String>,
}

impl Position {
    pub fn open(new: NewPosition) -> Result<Self> {
        if new.quantity <= Decimal::ZERO {
            return Err(Error::InvalidPosition(format!(
                "quantity must be positive, got {}",
                new.quantity
            )));
        }
        let correct_side = match new.side {
            Side::Long => new.stop_loss < new.entry_price && new.take_profit > new.entry_price,
            Side::Short => new.stop_loss > new.entry_price && new.take_profit < new.entry_price,
        };
        if !correct_side {
            return Err(Error::InvalidPosition(format!(
                "{} entry {} with stop {} and target {}",
                new.side, new.entry_price, new.stop_loss, new.take_profit
            )));
        }

        let entry_fee = fees::fill_fee(new.entry_price, new.quantity, new.fee_rate);
        Ok(Self {
            id: new.id,
            symbol: new.symbol,
            side: new.side,
            entry_price: new.entry_price,
            entry_time: new.entry_time,
            quantity: new.quantity,
            leverage: new.leverage,
            stop_loss: new.stop_loss,
            take_profit: new.take_profit,
            stop_reason: new.stop_reason,
            initial_stop: new.stop_loss,
            strategy_stop: new.strategy_stop,
            favorable_extreme: new.entry_price,
            breakeven_set: false,
            ever_profitable: false,
            bars_since_entry: 0,
            loss_recheck_fired: false,
            last_recheck_bar: None,
            secured_tier: 0,
            fee_rate: new.fee_rate,
            entry_fee,
            entry_rationale: new.entry_rationale,
        })
    }

    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Modeled round-trip fee in price terms (per unit of size).
    pub fn round_trip_fee_per_unit(&self) -> Decimal {
        fees::round_trip_fee_per_unit(self.entry_price, self.fee_rate)
    }

    /// The price at which closing recovers the modeled round-trip fee.
    pub fn breakeven_price(&self) -> Decimal {
        self.entry_price + self.side.sign() * self.round_trip_fee_per_unit()
    }

    /// Signed price move in the position's favor. Negative when underwater.
    pub fn favorable_excursion(&self, price: Decimal) -> Decimal {
        self.side.sign() * (price - self.entry_price)
    }

    /// Peak favorable move so far, never negative.
    pub fn peak_excursion(&self) -> Decimal {
        self.favorable_excursion(self.favorable_extreme).max(Decimal::ZERO)
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.favorable_excursion(price) * self.quantity
    }

    pub fn is_underwater(&self, price: Decimal) -> bool {
        self.favorable_excursion(price) < Decimal::ZERO
    }

    /// Folds the latest market data into the watermark and profit flags.
    pub fn observe(&mut self, price: Decimal, high: Decimal, low: Decimal) {
        let best = match self.side {
            Side::Long => high.max(price),
            Side::Short => low.min(price),
        };
        if self.favorable_excursion(best) > self.favorable_excursion(self.favorable_extreme) {
            self.favorable_extreme = best;
        }
        if self.favorable_excursion(price) > Decimal::ZERO {
            self.ever_profitable = true;
            self.loss_recheck_fired = false;
        }
    }

    /// A stop is usable when it still protects against the current price and
    /// does not sit beyond the target.
    pub fn is_valid_stop(&self, candidate: Decimal, price: Decimal) -> bool {
        match self.side {
            Side::Long => candidate < price && candidate < self.take_profit,
            Side::Short => candidate > price && candidate > self.take_profit,
        }
    }

    pub fn is_tighter(&self, candidate: Decimal) -> bool {
        match self.side {
            Side::Long => candidate > self.stop_loss,
            Side::Short => candidate < self.stop_loss,
        }
    }

    /// Adopts `candidate` if it is strictly tighter and still valid at `price`.
    /// Anything else is discarded; the stop is never clamped or loosened.
    pub fn tighten_stop(&mut self, candidate: Decimal, reason: StopReason, price: Decimal) -> bool {
        if !self.is_tighter(candidate) || !self.is_valid_stop(candidate, price) {
            return false;
        }
        self.stop_loss = candidate;
        self.stop_reason = reason;
        true
    }

    pub fn stop_touched(&self, low: Decimal, high: Decimal) -> bool {
        match self.side {
            Side::Long => low <= self.stop_loss,
            Side::Short => high >= self.stop_loss,
        }
    }

    pub fn target_touched(&self, low: Decimal, high: Decimal) -> bool {
        match self.side {
            Side::Long => high >= self.take_profit,
            Side::Short => low <= self.take_profit,
        }
    }

    /// Drops the filled part of a partial close, keeping the remainder open.
    pub fn reduce_quantity(&mut self, filled: Decimal) {
        let remaining = (self.quantity - filled).max(Decimal::ZERO);
        if !self.quantity.is_zero() {
            self.entry_fee = self.entry_fee * remaining / self.quantity;
        }
        self.quantity = remaining;
    }

    /// Finalizes the position into an immutable trade record.
    pub fn close(
        &self,
        exit_price: Decimal,
        exit_time: i64,
        exit_fee: Decimal,
        slippage: Decimal,
        exit_reason: ExitReason,
    ) -> TradeRecord {
        let gross_pnl = self.unrealized_pnl(exit_price);
        let fees = self.entry_fee + exit_fee;
        TradeRecord {
            position_id: self.id,
            symbol: self.symbol.clone(),
            side: self.side,
            entry_time: self.entry_time,
            exit_time,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            gross_pnl,
            fees,
            net_pnl: gross_pnl - fees,
            slippage,
            exit_reason,
            stop_reason_at_exit: self.stop_reason,
            entry_rationale: self.entry_rationale.clone(),
        }
    }
}
