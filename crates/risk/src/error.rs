// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Recoverable: hold and retry on the next event.
    #[error("Insufficient data for target computation: {0}")]
    InsufficientData(String),

    #[error("Hard loss cap distance {distance} is below one tick ({tick_size})")]
    HardCapUnachievable { distance: Decimal, tick_size: Decimal },

    #[error("Trade signal was vetoed: net reward/risk {ratio} is below minimum {minimum}")]
    RiskRewardTooLow { ratio: Decimal, minimum: Decimal },

    /// Stop or target on the wrong side of entry even after the fallback pass.
    #[error("Invalid targets after fallback: {0}")]
    InvalidTargets(String),
}

impl Error {
    /// Errors that leave the bot able to try again on the next bar.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidTargets(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
