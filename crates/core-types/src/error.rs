// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid instrument code: '{0}'")]
    InvalidInstrument(String),

    #[error("Invalid price sample for {instrument}: {reason}")]
    InvalidSample { instrument: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
