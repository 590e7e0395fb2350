// In crates/execution/src/error.rs

use core_types::Symbol;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Order rejected by venue: {reason}")]
    Rejected { reason: String },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("No open position for symbol {0}")]
    NoPosition(Symbol),

    #[error("Venue client error: {0}")]
    Venue(String),
}

pub type Result<T> = std::result::Result<T, Error>;
