// In crates/api-client/src/simulated.rs

use crate::types::{
    CandlePeriod, LiveTick, OrderHandle, PriceCallback, Quote, SubscriptionHandle,
};
use crate::{Error, MarketGateway, Result};
use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use core_types::{Candle, Instrument, InstrumentCode, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parameters for the random-walk market.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub seed: u64,
    /// Maximum move per step, in percent.
    pub volatility_pct: f64,
    /// Probability that a step carries a volume spike.
    pub spike_probability: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            seed: 7,
            volatility_pct: 0.4,
            spike_probability: 0.1,
        }
    }
}

#[derive(Debug)]
struct Walk {
    price: Decimal,
    prev_close: Decimal,
    history: Vec<Candle>,
}

struct MarketState {
    rng: StdRng,
    walks: HashMap<InstrumentCode, Walk>,
    holdings: HashMap<InstrumentCode, u64>,
    subscribers: HashMap<u64, (InstrumentCode, PriceCallback)>,
}

fn step(rng: &mut StdRng, params: &SimulationParams, price: Decimal) -> (Decimal, Decimal) {
    let vol = params.volatility_pct.abs().max(f64::EPSILON);
    let change_bp = rng.gen_range(-vol..vol) * 100.0;
    let change = Decimal::from(change_bp.round() as i64) / Decimal::from(10_000);
    let next = (price * (Decimal::ONE + change)).round_dp(0).max(Decimal::ONE);

    let mut volume = rng.gen_range(100u64..1_000);
    if rng.gen_bool(params.spike_probability.clamp(0.0, 1.0)) {
        volume *= 4;
    }
    (next, Decimal::from(volume))
}

fn bar(rng: &mut StdRng, params: &SimulationParams, open: Decimal, time: DateTime<Utc>) -> Candle {
    let (close, volume) = step(rng, params, open);
    Candle {
        time,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume,
    }
}

/// Builds a deterministic random-walk series of `bars` candles starting at `start`.
pub fn synthetic_series(
    params: &SimulationParams,
    start_price: Decimal,
    start: DateTime<Utc>,
    period: CandlePeriod,
    bars: usize,
) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut price = start_price;
    (0..bars)
        .map(|i| {
            let candle = bar(&mut rng, params, price, start + period.duration() * i as i32);
            price = candle.close;
            candle
        })
        .collect()
}

/// An in-process market for paper sessions.
///
/// Prices follow a seeded random walk. Candle history is extended lazily up to the
/// current period, so repeated requests return a consistent series. Pushed ticks are
/// produced by `spawn_ticker`.
pub struct SimulatedGateway {
    params: SimulationParams,
    state: Mutex<MarketState>,
    next_subscription: AtomicU64,
    next_order: AtomicU64,
}

impl SimulatedGateway {
    pub fn new(universe: &[Instrument], params: SimulationParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let walks = universe
            .iter()
            .map(|instrument| {
                let price = Decimal::from(rng.gen_range(50u64..2_000) * 100);
                let walk = Walk { price, prev_close: price, history: Vec::new() };
                (instrument.code.clone(), walk)
            })
            .collect();

        Self {
            params,
            state: Mutex::new(MarketState {
                rng,
                walks,
                holdings: HashMap::new(),
                subscribers: HashMap::new(),
            }),
            next_subscription: AtomicU64::new(1),
            next_order: AtomicU64::new(1),
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Pushes one tick per subscription every `interval` until `shutdown` fires.
    pub fn spawn_ticker(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => gateway.push_ticks().await,
                }
            }
            tracing::debug!("Simulated ticker stopped.");
        })
    }

    async fn push_ticks(&self) {
        let now = Utc::now();
        let deliveries: Vec<(PriceCallback, LiveTick)> = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let targets: Vec<(InstrumentCode, PriceCallback)> = state
                .subscribers
                .values()
                .map(|(code, cb)| (code.clone(), Arc::clone(cb)))
                .collect();
            targets
                .into_iter()
                .filter_map(|(code, cb)| {
                    let walk = state.walks.get_mut(&code)?;
                    let (price, volume) = step(&mut state.rng, &self.params, walk.price);
                    walk.price = price;
                    Some((cb, LiveTick { instrument: code, price, volume, timestamp: now }))
                })
                .collect()
        };
        // Callbacks run outside the lock.
        for (callback, tick) in deliveries {
            callback(tick);
        }
    }
}

#[async_trait]
impl MarketGateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        "SimulatedGateway"
    }

    async fn get_quote(&self, instrument: &InstrumentCode) -> Result<Quote> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let walk = state
            .walks
            .get_mut(instrument)
            .ok_or_else(|| Error::ApiError { code: "404".into(), msg: format!("unknown instrument {instrument}") })?;
        let (price, volume) = step(&mut state.rng, &self.params, walk.price);
        walk.price = price;
        Ok(Quote {
            price,
            prev_close: walk.prev_close,
            volume,
            high: None,
            low: None,
            open: None,
        })
    }

    async fn get_candles(
        &self,
        instrument: &InstrumentCode,
        period: CandlePeriod,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let span = period.duration();
        let current = Utc::now()
            .duration_trunc(span)
            .map_err(|e| Error::Transport(format!("cannot align candle period {period}: {e}")))?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let walk = state
            .walks
            .get_mut(instrument)
            .ok_or_else(|| Error::ApiError { code: "404".into(), msg: format!("unknown instrument {instrument}") })?;

        let mut next_time = match walk.history.last() {
            Some(last) => last.time + span,
            None => current - span * count.saturating_sub(1) as i32,
        };
        while next_time <= current {
            let candle = bar(&mut state.rng, &self.params, walk.price, next_time);
            walk.price = candle.close;
            walk.history.push(candle);
            next_time += span;
        }

        let start = walk.history.len().saturating_sub(count);
        Ok(walk.history[start..].to_vec())
    }

    async fn place_order(
        &self,
        instrument: &InstrumentCode,
        side: Side,
        quantity: u64,
        _price: Option<Decimal>,
    ) -> Result<OrderHandle> {
        let mut state = self.state.lock().await;
        let price = state
            .walks
            .get(instrument)
            .map(|w| w.price)
            .ok_or_else(|| Error::Rejected(format!("unknown instrument {instrument}")))?;

        let held = state.holdings.entry(instrument.clone()).or_insert(0);
        match side {
            Side::Buy => *held += quantity,
            Side::Sell if *held >= quantity => *held -= quantity,
            Side::Sell => {
                return Err(Error::Rejected(format!(
                    "sell of {quantity} exceeds holdings of {held} for {instrument}"
                )));
            }
        }

        let id = self.next_order.fetch_add(1, Ordering::Relaxed);
        Ok(OrderHandle {
            order_id: format!("SIM-{id:06}"),
            filled_price: Some(price),
            filled_quantity: quantity,
        })
    }

    async fn get_open_quantity(&self, instrument: &InstrumentCode) -> Result<u64> {
        Ok(self.state.lock().await.holdings.get(instrument).copied().unwrap_or(0))
    }

    async fn subscribe_live_price(
        &self,
        instrument: &InstrumentCode,
        callback: PriceCallback,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.state.lock().await;
        if !state.walks.contains_key(instrument) {
            return Err(Error::Rejected(format!("unknown instrument {instrument}")));
        }
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        state.subscribers.insert(id, (instrument.clone(), callback));
        Ok(SubscriptionHandle { id, instrument: instrument.clone() })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.state
            .lock()
            .await
            .subscribers
            .remove(&handle.id)
            .map(|_| ())
            .ok_or(Error::NotSubscribed(handle.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn universe() -> Vec<Instrument> {
        vec![Instrument::new("005930", "Samsung Electronics"), Instrument::new("000660", "SK Hynix")]
    }

    #[test]
    fn synthetic_series_is_deterministic_and_ascending() {
        let params = SimulationParams::default();
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let a = synthetic_series(&params, dec!(10000), start, CandlePeriod::Minutes(10), 50);
        let b = synthetic_series(&params, dec!(10000), start, CandlePeriod::Minutes(10), 50);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].time < w[1].time && w[1].open == w[0].close));
    }

    #[tokio::test]
    async fn candle_history_is_stable_between_calls() {
        let gateway = SimulatedGateway::new(&universe(), SimulationParams::default());
        let code: InstrumentCode = "005930".into();
        let first = gateway.get_candles(&code, CandlePeriod::Day, 30).await.unwrap();
        let second = gateway.get_candles(&code, CandlePeriod::Day, 30).await.unwrap();
        assert_eq!(first.len(), 30);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn orders_track_holdings() {
        let gateway = SimulatedGateway::new(&universe(), SimulationParams::default());
        let code: InstrumentCode = "000660".into();
        gateway.place_order(&code, Side::Buy, 3, None).await.unwrap();
        assert_eq!(gateway.get_open_quantity(&code).await.unwrap(), 3);
        assert!(gateway.place_order(&code, Side::Sell, 5, None).await.is_err());
        gateway.place_order(&code, Side::Sell, 3, None).await.unwrap();
        assert_eq!(gateway.get_open_quantity(&code).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ticks_reach_subscribers_until_unsubscribed() {
        let gateway = Arc::new(SimulatedGateway::new(&universe(), SimulationParams::default()));
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let handle = gateway
            .subscribe_live_price(&"005930".into(), Arc::new(move |_tick: LiveTick| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .await
            .unwrap();

        gateway.push_ticks().await;
        gateway.push_ticks().await;
        assert_eq!(received.load(Ordering::SeqCst), 2);

        gateway.unsubscribe(&handle).await.unwrap();
        gateway.push_ticks().await;
        assert_eq!(received.load(Ordering::SeqCst), 2);
        assert!(matches!(gateway.unsubscribe(&handle).await, Err(Error::NotSubscribed(_))));
    }
}
