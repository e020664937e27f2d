// In crates/engine/src/live_feed.rs

use crate::pipeline::Pipeline;
use crate::supervisor::{ConnectionHealth, LiveFeedControl};
use api_client::{CandlePeriod, LiveTick, MarketGateway, PriceCallback, SubscriptionHandle};
use async_trait::async_trait;
use core_types::{FeedSource, Instrument, InstrumentCode, PriceSample};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Turns pushed gateway prices into pipeline samples for the live set.
///
/// The gateway callback only records liveness and enqueues the tick; it never blocks. The
/// consumer routes ticks to one worker per instrument, so per-instrument ordering is kept.
pub struct LiveFeedAdapter {
    gateway: Arc<dyn MarketGateway>,
    pipeline: Arc<Pipeline>,
    health: Arc<ConnectionHealth>,
    instruments: Vec<Instrument>,
    seed_period: CandlePeriod,
    seed_count: usize,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    sender: mpsc::Sender<LiveTick>,
    receiver: Mutex<Option<mpsc::Receiver<LiveTick>>>,
    dropped: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl LiveFeedAdapter {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        pipeline: Arc<Pipeline>,
        health: Arc<ConnectionHealth>,
        instruments: Vec<Instrument>,
        seed_period: CandlePeriod,
        seed_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        Self {
            gateway,
            pipeline,
            health,
            instruments,
            seed_period,
            seed_count,
            subscriptions: Mutex::new(Vec::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
            dropped: Arc::new(AtomicU64::new(0)),
            queue_capacity,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    fn callback(&self) -> PriceCallback {
        let sender = self.sender.clone();
        let health = Arc::clone(&self.health);
        let dropped = Arc::clone(&self.dropped);
        Arc::new(move |tick: LiveTick| {
            health.record_event();
            if let Err(mpsc::error::TrySendError::Full(tick)) = sender.try_send(tick) {
                dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(instrument = %tick.instrument, "Live queue full; dropping tick.");
            }
        })
    }

    /// Loads recent candles for every live instrument so the averages are valid before the
    /// first pushed price. Failures are logged; the instrument then warms up from live data.
    pub async fn preseed_all(&self) -> usize {
        let mut seeded = 0;
        for instrument in &self.instruments {
            let code = &instrument.code;
            let candles = match self.gateway.get_candles(code, self.seed_period, self.seed_count).await {
                Ok(candles) => candles,
                Err(e) => {
                    tracing::warn!(instrument = %code, error = %e, "Could not fetch seed history.");
                    continue;
                }
            };
            match self.pipeline.preseed(code, &candles).await {
                Ok(_) => seeded += 1,
                Err(e) => tracing::warn!(instrument = %code, error = %e, "Could not pre-seed instrument."),
            }
        }
        tracing::info!(seeded, total = self.instruments.len(), "Live instruments pre-seeded.");
        seeded
    }

    /// Pre-seeds and subscribes every live instrument.
    pub async fn initialize(&self) -> anyhow::Result<usize> {
        self.preseed_all().await;
        self.subscribe_all().await
    }

    /// Drains queued ticks until `shutdown` fires.
    ///
    /// Each instrument gets its own worker task, spawned on its first tick. A slow order on
    /// one instrument holds up only that instrument's ticks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(mut receiver) = self.receiver.lock().await.take() else {
            tracing::error!("Live feed consumer is already running.");
            return;
        };
        tracing::info!(instruments = self.instruments.len(), "Live feed consumer started.");

        let mut workers: HashMap<InstrumentCode, mpsc::Sender<LiveTick>> = HashMap::new();
        let mut handles = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe_tick = receiver.recv() => match maybe_tick {
                    Some(tick) => self.dispatch(tick, &mut workers, &mut handles, &shutdown),
                    None => break,
                },
            }
        }

        drop(workers);
        futures::future::join_all(handles).await;
        *self.receiver.lock().await = Some(receiver);
        tracing::info!(dropped = self.dropped_ticks(), "Live feed consumer stopped.");
    }

    fn dispatch(
        &self,
        tick: LiveTick,
        workers: &mut HashMap<InstrumentCode, mpsc::Sender<LiveTick>>,
        handles: &mut Vec<JoinHandle<()>>,
        shutdown: &CancellationToken,
    ) {
        let sender = workers.entry(tick.instrument.clone()).or_insert_with(|| {
            let (sender, ticks) = mpsc::channel(self.queue_capacity);
            let pipeline = Arc::clone(&self.pipeline);
            handles.push(tokio::spawn(instrument_worker(pipeline, ticks, shutdown.clone())));
            sender
        });
        if let Err(mpsc::error::TrySendError::Full(tick)) = sender.try_send(tick) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(instrument = %tick.instrument, "Instrument queue full; dropping tick.");
        }
    }
}

async fn instrument_worker(
    pipeline: Arc<Pipeline>,
    mut ticks: mpsc::Receiver<LiveTick>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe_tick = ticks.recv() => match maybe_tick {
                Some(tick) => handle_tick(&pipeline, tick).await,
                None => break,
            },
        }
    }
}

async fn handle_tick(pipeline: &Pipeline, tick: LiveTick) {
    let sample = match PriceSample::new(tick.instrument, tick.price, tick.volume, tick.timestamp, FeedSource::Live) {
        Ok(sample) => sample,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding invalid live tick.");
            return;
        }
    };
    let instrument = sample.instrument.clone();
    if let Err(e) = pipeline.process(sample).await {
        tracing::warn!(instrument = %instrument, error = %e, "Live sample failed in pipeline.");
    }
}

#[async_trait]
impl LiveFeedControl for LiveFeedAdapter {
    async fn unsubscribe_all(&self) {
        let handles: Vec<SubscriptionHandle> = self.subscriptions.lock().await.drain(..).collect();
        for handle in &handles {
            if let Err(e) = self.gateway.unsubscribe(handle).await {
                tracing::warn!(instrument = %handle.instrument, error = %e, "Unsubscribe failed.");
            }
        }
        tracing::debug!(released = handles.len(), "Live subscriptions released.");
    }

    async fn subscribe_all(&self) -> anyhow::Result<usize> {
        let mut subscriptions = self.subscriptions.lock().await;
        let mut failed = 0;
        for instrument in &self.instruments {
            if subscriptions.iter().any(|h| h.instrument == instrument.code) {
                continue;
            }
            match self.gateway.subscribe_live_price(&instrument.code, self.callback()).await {
                Ok(handle) => subscriptions.push(handle),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(instrument = %instrument.code, error = %e, "Live subscription failed.");
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} of {} live subscriptions failed", self.instruments.len());
        }
        tracing::info!(subscriptions = subscriptions.len(), "Live instruments subscribed.");
        Ok(subscriptions.len())
    }

    async fn reinitialize(&self) -> anyhow::Result<()> {
        self.unsubscribe_all().await;
        self.preseed_all().await;
        self.subscribe_all().await.map(|_| ())
    }
}
