// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid indicator window '{name}': {reason}")]
    InvalidWindow { name: &'static str, reason: String },

    #[error("Value for {instrument} cannot be represented as f64: {value}")]
    NonFinite { instrument: String, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
