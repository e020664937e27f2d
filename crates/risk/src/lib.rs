// In crates/risk/src/lib.rs

use chrono::{DateTime, Utc};
use core_types::{ClosedTrade, Execution, InstrumentCode, OrderIntent, Position, SignalEvent};
use rust_decimal::Decimal;

pub mod error;
pub mod fees;
pub mod position_manager;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use fees::{FeeBook, FeeSchedule, ProfitBreakdown};
pub use position_manager::PositionManager;
pub use types::{FeeSettings, RiskSettings};

/// The universal interface for a position and risk manager.
///
/// A `RiskManager` exclusively owns the open-position records. It turns crossover
/// signals and raw price updates into `OrderIntent`s, and only mutates positions once
/// the resulting orders are confirmed (or refused) by the executor.
pub trait RiskManager: Send + Sync {
    /// The name of the risk management policy.
    fn name(&self) -> &'static str;

    /// Evaluates a crossover signal.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(OrderIntent))`: the signal should be acted upon.
    /// * `Ok(None)`: nothing to do, including a deliberately deferred exit.
    /// * `Err(Error::Vetoed)`: the signal broke a risk rule.
    fn on_signal(&self, signal: &SignalEvent) -> Result<Option<OrderIntent>>;

    /// Checks protective exits (stop-loss, take-profit) for an open position.
    fn on_price_update(
        &self,
        instrument: &InstrumentCode,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Option<OrderIntent>;

    /// Commits a confirmed fill. Returns the realized trade for exits.
    fn on_order_filled(&self, intent: &OrderIntent, execution: &Execution) -> Option<ClosedTrade>;

    /// Rolls back anything reserved for an intent that was never filled.
    fn on_order_failed(&self, intent: &OrderIntent);

    /// Drops a position the broker reports as no longer held.
    fn on_position_missing(&self, instrument: &InstrumentCode);

    fn position(&self, instrument: &InstrumentCode) -> Option<Position>;

    fn open_positions(&self) -> usize;
}
