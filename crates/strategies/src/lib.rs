// In crates/strategies/src/lib.rs

use core_types::{IndicatorSnapshot, SignalEvent};

pub mod error;
pub mod indicator_store;
pub mod ma_crossover;
pub mod types;

pub use error::{Error, Result};
pub use indicator_store::IndicatorStore;
pub use ma_crossover::CrossoverDetector;
pub use types::{IndicatorSettings, SignalFilterSettings};

/// The universal interface for a signal strategy.
///
/// A strategy turns the indicator snapshot produced by the store into a `SignalEvent`.
/// Implementations keep their own per-instrument state and must not depend on which
/// feed produced the snapshot.
pub trait Strategy: Send + Sync {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> SignalEvent;
}
