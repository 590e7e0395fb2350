// In crates/engine/src/error.rs

use crate::state::BotState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config for {got} cannot replace config for {expected}")]
    ConfigMismatch { expected: String, got: String },

    #[error("Invalid bot config: {0}")]
    InvalidConfig(#[from] core_types::Error),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::Error),

    #[error("Illegal state transition from {from} to {to}")]
    IllegalTransition { from: BotState, to: BotState },

    #[error("Bot {0} is no longer running")]
    BotGone(String),

    #[error("Market data gateway error: {0}")]
    Gateway(String),
}

pub type Result<T> = std::result::Result<T, Error>;
