// In crates/api-client/src/lib.rs

use async_trait::async_trait;
use core_types::{Candle, InstrumentCode, Side};
use rust_decimal::Decimal;

pub mod error;
pub mod simulated;
pub mod timeout;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use simulated::{SimulatedGateway, SimulationParams};
pub use timeout::TimedGateway;
pub use types::*;

/// The brokerage as seen by the engine: quotes, candles, orders, holdings and the live
/// price feed.
///
/// Implementations own their transport. Callers may assume every method eventually
/// returns; wrap an implementation in `TimedGateway` to enforce that.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// The name of the gateway (e.g., "KisGateway", "SimulatedGateway").
    fn name(&self) -> &'static str;

    async fn get_quote(&self, instrument: &InstrumentCode) -> Result<Quote>;

    /// Returns up to `count` bars ordered by ascending time.
    async fn get_candles(
        &self,
        instrument: &InstrumentCode,
        period: CandlePeriod,
        count: usize,
    ) -> Result<Vec<Candle>>;

    /// Places an order. `price == None` means a market order.
    async fn place_order(
        &self,
        instrument: &InstrumentCode,
        side: Side,
        quantity: u64,
        price: Option<Decimal>,
    ) -> Result<OrderHandle>;

    async fn get_open_quantity(&self, instrument: &InstrumentCode) -> Result<u64>;

    /// Registers `callback` for every pushed price of `instrument`.
    async fn subscribe_live_price(
        &self,
        instrument: &InstrumentCode,
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;
}
