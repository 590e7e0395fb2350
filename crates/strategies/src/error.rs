// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid parameters for strategy '{name}': {reason}")]
    InvalidParams { name: String, reason: String },

    #[error("Failed to parse strategy parameters: {0}")]
    Params(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
