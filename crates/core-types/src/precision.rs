// In crates/core-types/src/precision.rs

use crate::types::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Venue-supplied precision constraints for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRules {
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Minimum size increment.
    pub step_size: Decimal,
    #[serde(default)]
    pub min_quantity: Decimal,
}

impl Default for PrecisionRules {
    fn default() -> Self {
        Self {
            tick_size: Decimal::new(1, 2),
            step_size: Decimal::new(1, 3),
            min_quantity: Decimal::ZERO,
        }
    }
}

fn floor_to(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

fn ceil_to(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).ceil() * step
}

impl PrecisionRules {
    pub fn floor_price(&self, price: Decimal) -> Decimal {
        floor_to(price, self.tick_size).normalize()
    }

    pub fn ceil_price(&self, price: Decimal) -> Decimal {
        ceil_to(price, self.tick_size).normalize()
    }

    /// Rounds a stop to the tick in the direction of entry, so rounding never adds risk.
    pub fn round_stop(&self, side: Side, stop: Decimal) -> Decimal {
        match side {
            Side::Long => self.ceil_price(stop),
            Side::Short => self.floor_price(stop),
        }
    }

    /// Rounds a target to the tick away from entry, so rounding never shrinks the reward.
    pub fn round_target(&self, side: Side, target: Decimal) -> Decimal {
        match side {
            Side::Long => self.ceil_price(target),
            Side::Short => self.floor_price(target),
        }
    }

    pub fn floor_quantity(&self, quantity: Decimal) -> Decimal {
        floor_to(quantity, self.step_size).normalize()
    }
}
