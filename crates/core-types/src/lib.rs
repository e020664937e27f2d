// In crates/core-types/src/lib.rs

pub mod error;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use types::{
    Candle, ClosedTrade, Execution, ExitReason, FeedSource, FilterRejection, IndicatorSnapshot,
    Instrument, InstrumentCode, OrderIntent, OrderReason, Position, PriceSample, Regime, Side,
    SignalEvent, SignalKind, SignalReason,
};
