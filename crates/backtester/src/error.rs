// In crates/backtester/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid bot configuration: {0}")]
    InvalidConfig(#[from] core_types::Error),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::Error),

    #[error("Not enough data: {have} coarse bars for a warmup of {warmup}")]
    NotEnoughData { have: usize, warmup: usize },

    #[error("The {0} series is not in strictly increasing time order")]
    Unordered(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
