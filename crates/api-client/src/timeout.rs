// In crates/api-client/src/timeout.rs

use crate::types::{CandlePeriod, OrderHandle, PriceCallback, Quote, SubscriptionHandle};
use crate::{Error, MarketGateway, Result};
use async_trait::async_trait;
use core_types::{Candle, InstrumentCode, Side};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Bounds every call of the wrapped gateway by a fixed timeout.
///
/// An elapsed timeout becomes `Error::Timeout`; the inner future is dropped.
pub struct TimedGateway {
    inner: Arc<dyn MarketGateway>,
    timeout: Duration,
}

impl TimedGateway {
    pub fn new(inner: Arc<dyn MarketGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl MarketGateway for TimedGateway {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_quote(&self, instrument: &InstrumentCode) -> Result<Quote> {
        self.bounded("get_quote", self.inner.get_quote(instrument)).await
    }

    async fn get_candles(
        &self,
        instrument: &InstrumentCode,
        period: CandlePeriod,
        count: usize,
    ) -> Result<Vec<Candle>> {
        self.bounded("get_candles", self.inner.get_candles(instrument, period, count))
            .await
    }

    async fn place_order(
        &self,
        instrument: &InstrumentCode,
        side: Side,
        quantity: u64,
        price: Option<Decimal>,
    ) -> Result<OrderHandle> {
        self.bounded("place_order", self.inner.place_order(instrument, side, quantity, price))
            .await
    }

    async fn get_open_quantity(&self, instrument: &InstrumentCode) -> Result<u64> {
        self.bounded("get_open_quantity", self.inner.get_open_quantity(instrument))
            .await
    }

    async fn subscribe_live_price(
        &self,
        instrument: &InstrumentCode,
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle> {
        self.bounded(
            "subscribe_live_price",
            self.inner.subscribe_live_price(instrument, callback),
        )
        .await
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.bounded("unsubscribe", self.inner.unsubscribe(handle)).await
    }
}
