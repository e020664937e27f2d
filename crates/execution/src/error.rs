// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("API client error: {0}")]
    ApiClientError(#[from] api_client::Error),

    #[error("{instrument} is already held at the broker ({quantity} shares)")]
    AlreadyHeld { instrument: String, quantity: u64 },

    #[error("No holdings of {instrument} at the broker")]
    NoHoldings { instrument: String },
}

pub type Result<T> = std::result::Result<T, Error>;
