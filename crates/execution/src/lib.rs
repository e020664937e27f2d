// In crates/execution/src/lib.rs

use async_trait::async_trait;
use core_types::{Execution, OrderIntent};

pub mod error;
pub mod live;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use live::LiveExecutor;
pub use simulated::SimulatedExecutor;
pub use types::SimulationSettings;

/// The universal interface for an execution handler.
///
/// An `Executor` takes an approved `OrderIntent` and submits it to a target, which could
/// be the brokerage or a simulation. It returns only once the order is confirmed or has
/// definitively failed.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The name of the executor (e.g., "LiveExecutor", "SimulatedExecutor").
    fn name(&self) -> &'static str;

    /// Executes a given order intent.
    ///
    /// # Returns
    ///
    /// The confirmed `Execution` on success. On error no order is working at the target.
    async fn execute(&self, intent: &OrderIntent) -> Result<Execution>;
}
