// In crates/api-client/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Response is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Malformed value for '{field}': '{value}'")]
    MalformedField { field: &'static str, value: String },

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),

    #[error("API error: code {code}, msg: {msg}")]
    ApiError { code: String, msg: String },

    #[error("No active subscription with id {0}")]
    NotSubscribed(u64),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
