// In crates/risk/src/sizing.rs

use crate::{Error, Result};
use core_types::BotConfig;
use rust_decimal::Decimal;

/// Sizes the position so its notional equals the allocated capital times leverage,
/// floored to the venue's size increment.
pub fn position_size(entry: Decimal, config: &BotConfig) -> Result<Decimal> {
    if entry <= Decimal::ZERO {
        return Err(Error::InsufficientData(format!("no usable entry price ({})", entry)));
    }
    let notional = config.allocated_capital * Decimal::from(config.leverage);
    let quantity = config.precision.floor_quantity(notional / entry);
    if quantity <= Decimal::ZERO || quantity < config.precision.min_quantity {
        return Err(Error::InsufficientData(format!(
            "size {} below venue minimum {} at price {}",
            quantity, config.precision.min_quantity, entry
        )));
    }
    Ok(quantity)
}
