// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown kline interval: {0}")]
    UnknownInterval(String),

    #[error("Invalid bot configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

pub type Result<T> = std::result::Result<T, Error>;
