// In crates/engine/tests/live_feed.rs

mod common;

use api_client::{
    CandlePeriod, Error, LiveTick, MarketGateway, OrderHandle, PriceCallback, Quote, Result,
    SubscriptionHandle,
};
use async_trait::async_trait;
use core_types::{Candle, Instrument, InstrumentCode, Side};
use engine::{ConnectionHealth, LiveFeedAdapter, LiveFeedControl, Pipeline};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Keeps every subscriber callback so tests can push prices through them.
#[derive(Default)]
struct PushGateway {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionHandle, PriceCallback)>>,
}

impl PushGateway {
    fn push(&self, code: &str, minute: i64, price: Decimal) {
        let callbacks: Vec<PriceCallback> = self
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(handle, _)| handle.instrument.as_str() == code)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(LiveTick {
                instrument: code.into(),
                price,
                volume: dec!(1000),
                timestamp: common::t0() + common::minutes(minute),
            });
        }
    }

    fn subscribers(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[async_trait]
impl MarketGateway for PushGateway {
    fn name(&self) -> &'static str {
        "PushGateway"
    }

    async fn get_quote(&self, _: &InstrumentCode) -> Result<Quote> {
        Err(Error::Rejected("quotes not scripted".into()))
    }

    async fn get_candles(&self, _: &InstrumentCode, _: CandlePeriod, _: usize) -> Result<Vec<Candle>> {
        Err(Error::Transport("history unavailable".into()))
    }

    async fn place_order(&self, _: &InstrumentCode, _: Side, _: u64, _: Option<Decimal>) -> Result<OrderHandle> {
        Err(Error::Rejected("orders not scripted".into()))
    }

    async fn get_open_quantity(&self, _: &InstrumentCode) -> Result<u64> {
        Ok(0)
    }

    async fn subscribe_live_price(&self, instrument: &InstrumentCode, callback: PriceCallback) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            instrument: instrument.clone(),
        };
        self.subscribers.lock().unwrap().push((handle.clone(), callback));
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let mut subscribers = self.subscribers.lock().unwrap();
        let before = subscribers.len();
        subscribers.retain(|(h, _)| h.id != handle.id);
        if subscribers.len() == before {
            return Err(Error::NotSubscribed(handle.id));
        }
        Ok(())
    }
}

fn adapter(
    gateway: &Arc<PushGateway>,
    pipeline: &Arc<Pipeline>,
    health: &Arc<ConnectionHealth>,
    universe: &[Instrument],
    queue_capacity: usize,
) -> Arc<LiveFeedAdapter> {
    Arc::new(LiveFeedAdapter::new(
        gateway.clone(),
        Arc::clone(pipeline),
        Arc::clone(health),
        universe.to_vec(),
        CandlePeriod::Minutes(1),
        10,
        queue_capacity,
    ))
}

fn spawn_consumer(adapter: &Arc<LiveFeedAdapter>, shutdown: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let adapter = Arc::clone(adapter);
    let shutdown = shutdown.clone();
    tokio::spawn(async move { adapter.run(shutdown).await })
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn pushed_ticks_reach_health_and_indicators() {
    let universe = common::universe(2);
    let pipeline = common::pipeline(&universe);
    let health = Arc::new(ConnectionHealth::new());
    let gateway = Arc::new(PushGateway::default());
    let adapter = adapter(&gateway, &pipeline, &health, &universe, 64);

    // Seed history is unavailable; subscriptions still go through.
    assert_eq!(adapter.initialize().await.unwrap(), 2);
    assert_eq!(gateway.subscribers(), 2);

    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(&adapter, &shutdown);

    for minute in 0..15 {
        for instrument in &universe {
            let price = Decimal::from(1_000 + (minute % 4) * 10);
            gateway.push(instrument.code.as_str(), minute, price);
        }
    }

    let last = common::t0() + common::minutes(14);
    wait_until(|| universe.iter().all(|i| pipeline.store().last_timestamp(&i.code) == Some(last))).await;

    assert_eq!(health.events_received(), 30);
    assert_eq!(adapter.dropped_ticks(), 0);
    for instrument in &universe {
        // Bounded by the long window.
        assert_eq!(pipeline.store().history_len(&instrument.code), 3);
    }

    shutdown.cancel();
    consumer.await.unwrap();
    adapter.unsubscribe_all().await;
    assert_eq!(adapter.subscription_count().await, 0);
    assert_eq!(gateway.subscribers(), 0);
}

#[tokio::test]
async fn full_queue_drops_and_counts_ticks() {
    let universe = common::universe(1);
    let code = universe[0].code.clone();
    let pipeline = common::pipeline(&universe);
    let health = Arc::new(ConnectionHealth::new());
    let gateway = Arc::new(PushGateway::default());
    let adapter = adapter(&gateway, &pipeline, &health, &universe, 2);
    adapter.subscribe_all().await.unwrap();

    // Nothing drains the queue yet.
    for minute in 0..5 {
        gateway.push(code.as_str(), minute, dec!(1000));
    }
    assert_eq!(health.events_received(), 5);
    assert_eq!(adapter.dropped_ticks(), 3);

    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(&adapter, &shutdown);
    let kept = common::t0() + common::minutes(1);
    wait_until(|| pipeline.store().last_timestamp(&code) == Some(kept)).await;
    assert_eq!(pipeline.store().history_len(&code), 2);

    shutdown.cancel();
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_order_holds_up_only_its_own_instrument() {
    let universe = common::universe(2);
    let (a, b) = (universe[0].code.clone(), universe[1].code.clone());
    let executor = Arc::new(common::SlowExecutor::new(Duration::from_secs(1)));
    let pipeline = common::pipeline_with(&universe, executor.clone());
    let health = Arc::new(ConnectionHealth::new());
    let gateway = Arc::new(PushGateway::default());
    let adapter = adapter(&gateway, &pipeline, &health, &universe, 64);
    adapter.subscribe_all().await.unwrap();

    let shutdown = CancellationToken::new();
    let consumer = spawn_consumer(&adapter, &shutdown);

    // The fourth tick of `a` is a golden cross; its entry takes a second to fill.
    for (minute, price) in [dec!(100), dec!(99), dec!(98), dec!(105), dec!(106)].into_iter().enumerate() {
        gateway.push(a.as_str(), minute as i64, price);
    }
    for (minute, price) in [dec!(100), dec!(101), dec!(102), dec!(103)].into_iter().enumerate() {
        gateway.push(b.as_str(), minute as i64, price);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(executor.orders.load(Ordering::SeqCst), 1);
    assert!(pipeline.risk().position(&a).is_none());
    assert_eq!(pipeline.store().last_timestamp(&a), Some(common::t0() + common::minutes(3)));
    assert_eq!(pipeline.store().last_timestamp(&b), Some(common::t0() + common::minutes(3)));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(pipeline.risk().position(&a).is_some());
    assert_eq!(pipeline.store().last_timestamp(&a), Some(common::t0() + common::minutes(4)));

    shutdown.cancel();
    consumer.await.unwrap();
}
