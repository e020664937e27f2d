// In crates/engine/tests/common/mod.rs

#![allow(dead_code)]

use api_client::{
    CandlePeriod, Error, MarketGateway, OrderHandle, PriceCallback, Quote, Result,
    SubscriptionHandle,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use core_types::{Candle, Execution, Instrument, InstrumentCode, OrderIntent, Side};
use engine::Pipeline;
use execution::{Executor, SimulatedExecutor, SimulationSettings};
use risk::{FeeSettings, PositionManager, RiskSettings};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use strategies::{CrossoverDetector, IndicatorSettings, IndicatorStore, SignalFilterSettings};

pub fn universe(n: usize) -> Vec<Instrument> {
    (0..n)
        .map(|i| Instrument::new(format!("{:06}", 100 + i), format!("Stock {i}")))
        .collect()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
}

/// Small windows and no filters, so a handful of samples produce a crossover.
pub fn pipeline(universe: &[Instrument]) -> Arc<Pipeline> {
    let executor = SimulatedExecutor::new(SimulationSettings { slippage_pct: 0.0 }).unwrap();
    pipeline_with(universe, Arc::new(executor))
}

pub fn pipeline_with(universe: &[Instrument], executor: Arc<dyn Executor>) -> Arc<Pipeline> {
    let store = IndicatorStore::new(IndicatorSettings {
        short_window: 2,
        long_window: 3,
        rsi_period: 2,
        volume_ma_period: 2,
    })
    .unwrap();
    let detector = CrossoverDetector::new(SignalFilterSettings {
        use_ma_gap_filter: false,
        use_volume_filter: false,
        use_rsi_filter: false,
        signal_cooldown_minutes: 0,
        ..SignalFilterSettings::default()
    });
    let risk = PositionManager::new(RiskSettings::default(), &FeeSettings::default(), universe).unwrap();
    Arc::new(Pipeline::new(store, Arc::new(detector), Arc::new(risk), executor))
}

/// Fills every order at its reference price after a fixed delay.
pub struct SlowExecutor {
    pub delay: StdDuration,
    pub orders: AtomicUsize,
}

impl SlowExecutor {
    pub fn new(delay: StdDuration) -> Self {
        Self { delay, orders: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Executor for SlowExecutor {
    fn name(&self) -> &'static str {
        "SlowExecutor"
    }

    async fn execute(&self, intent: &OrderIntent) -> execution::Result<Execution> {
        self.orders.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Execution {
            order_id: format!("slow-{}", intent.instrument),
            instrument: intent.instrument.clone(),
            side: intent.side,
            price: intent.reference_price,
            quantity: intent.quantity,
            executed_at: intent.created_at,
        })
    }
}

/// Serves a fixed candle series per instrument and records every candle request.
#[derive(Default)]
pub struct ScriptedGateway {
    failing: HashSet<InstrumentCode>,
    pub candle_calls: Mutex<Vec<InstrumentCode>>,
}

impl ScriptedGateway {
    pub fn failing(codes: &[&str]) -> Self {
        Self {
            failing: codes.iter().map(|c| InstrumentCode::from(*c)).collect(),
            candle_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, code: &str) -> usize {
        self.candle_calls.lock().unwrap().iter().filter(|c| c.as_str() == code).count()
    }
}

#[async_trait]
impl MarketGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "ScriptedGateway"
    }

    async fn get_quote(&self, _: &InstrumentCode) -> Result<Quote> {
        Err(Error::Rejected("quotes not scripted".into()))
    }

    async fn get_candles(&self, instrument: &InstrumentCode, period: CandlePeriod, count: usize) -> Result<Vec<Candle>> {
        self.candle_calls.lock().unwrap().push(instrument.clone());
        if self.failing.contains(instrument) {
            return Err(Error::Transport("connection reset".into()));
        }
        let step = period.duration();
        Ok((0..count)
            .map(|i| {
                let close = Decimal::from(1_000 + (i % 7) as i64 * 5);
                Candle {
                    time: t0() + step * i as i32,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: Decimal::from(100),
                }
            })
            .collect())
    }

    async fn place_order(&self, _: &InstrumentCode, _: Side, _: u64, _: Option<Decimal>) -> Result<OrderHandle> {
        Err(Error::Rejected("orders not scripted".into()))
    }

    async fn get_open_quantity(&self, _: &InstrumentCode) -> Result<u64> {
        Ok(0)
    }

    async fn subscribe_live_price(&self, _: &InstrumentCode, _: PriceCallback) -> Result<SubscriptionHandle> {
        Err(Error::Rejected("live prices not scripted".into()))
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        Err(Error::NotSubscribed(handle.id))
    }
}

pub fn minutes(n: i64) -> ChronoDuration {
    ChronoDuration::minutes(n)
}
