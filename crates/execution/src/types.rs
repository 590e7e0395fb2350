// In crates/execution/src/types.rs

use core_types::{Side, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    /// The simulated slippage fraction for market orders (e.g., 0.0005 for 0.05%).
    #[serde(default)]
    pub slippage_percent: Decimal,

    /// Starting cash of the simulated portfolio. Defaults to the bot's allocated capital.
    #[serde(default)]
    pub initial_cash: Option<Decimal>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            slippage_percent: dec!(0.0005),
            initial_cash: None,
        }
    }
}

/// A market entry order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub leverage: u8,
    /// Best-known price at request time. Simulated fills start from it.
    pub price_hint: Decimal,
    pub fee_rate: Decimal,
    pub time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillStatus {
    Full,
    Partial,
}

/// What the venue reported for an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub price: Decimal,
    pub quantity: Decimal,
    pub requested_quantity: Decimal,
    pub fee: Decimal,
    /// Cost of the fill versus the requested price, in quote currency.
    pub slippage: Decimal,
    pub status: FillStatus,
}

impl Fill {
    pub fn is_partial(&self) -> bool {
        self.status == FillStatus::Partial
    }

    pub fn unfilled(&self) -> Decimal {
        (self.requested_quantity - self.quantity).max(Decimal::ZERO)
    }
}

/// A position as the venue sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenuePosition {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// Represents the state of the simulated trading portfolio.
#[derive(Debug, Clone)]
pub struct Portfolio {
    /// The total cash balance of the portfolio (e.g., in USDT).
    pub cash: Decimal,

    /// The currently open positions, keyed by symbol.
    pub open_positions: HashMap<Symbol, VenuePosition>,
}

impl Portfolio {
    /// Creates a new portfolio with an initial cash balance.
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            open_positions: HashMap::new(),
        }
    }
}

/// Worst-side price for a market order: buys fill higher, sells lower.
pub fn apply_slippage(price: Decimal, buying: bool, slippage_percent: Decimal) -> Decimal {
    if buying {
        price * (Decimal::ONE + slippage_percent)
    } else {
        price * (Decimal::ONE - slippage_percent)
    }
}

/// Fill price for opening `side`.
pub fn entry_fill_price(side: Side, price: Decimal, slippage_percent: Decimal) -> Decimal {
    apply_slippage(price, side == Side::Long, slippage_percent)
}

/// Fill price for closing a position held on `side`.
pub fn exit_fill_price(side: Side, price: Decimal, slippage_percent: Decimal) -> Decimal {
    apply_slippage(price, side == Side::Short, slippage_percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_always_hurts() {
        let s = dec!(0.001);
        assert_eq!(entry_fill_price(Side::Long, dec!(100), s), dec!(100.1));
        assert_eq!(entry_fill_price(Side::Short, dec!(100), s), dec!(99.9));
        assert_eq!(exit_fill_price(Side::Long, dec!(100), s), dec!(99.9));
        assert_eq!(exit_fill_price(Side::Short, dec!(100), s), dec!(100.1));
    }
}
