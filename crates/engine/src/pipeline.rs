// In crates/engine/src/pipeline.rs

use anyhow::{Context, Result};
use core_types::{
    Candle, ClosedTrade, Execution, FeedSource, InstrumentCode, OrderIntent, PriceSample,
    SignalEvent, SignalKind,
};
use dashmap::DashMap;
use execution::Executor;
use risk::RiskManager;
use std::sync::Arc;
use strategies::{IndicatorStore, Strategy};
use tokio::sync::Mutex;

/// What one price sample produced on its way through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub signal: Option<SignalEvent>,
    pub intent: Option<OrderIntent>,
    pub execution: Option<Execution>,
    pub closed_trade: Option<ClosedTrade>,
}

impl PipelineOutcome {
    pub fn fired(&self) -> Option<SignalKind> {
        self.signal.as_ref().map(|s| s.kind).filter(|k| *k != SignalKind::None)
    }
}

/// Result of handing a freshly polled candle series to the pipeline.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The newest bar advanced the history and was evaluated.
    Ingested(PipelineOutcome),
    /// The newest bar was already seen. Only protective exits were checked.
    Unchanged(PipelineOutcome),
}

/// Store -> detector -> risk -> executor, shared by the live feed and the poll scheduler.
///
/// Every instrument has its own async lock, held for the whole ingest-to-fill sequence, so
/// updates for one instrument are applied in arrival order and never interleave. Different
/// instruments proceed in parallel.
pub struct Pipeline {
    store: IndicatorStore,
    strategy: Arc<dyn Strategy>,
    risk: Arc<dyn RiskManager>,
    executor: Arc<dyn Executor>,
    locks: DashMap<InstrumentCode, Arc<Mutex<()>>>,
}

impl Pipeline {
    pub fn new(
        store: IndicatorStore,
        strategy: Arc<dyn Strategy>,
        risk: Arc<dyn RiskManager>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        tracing::info!(
            strategy = strategy.name(),
            risk = risk.name(),
            executor = executor.name(),
            "Pipeline assembled."
        );
        Self {
            store,
            strategy,
            risk,
            executor,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &IndicatorStore {
        &self.store
    }

    pub fn risk(&self) -> &Arc<dyn RiskManager> {
        &self.risk
    }

    fn lock_for(&self, instrument: &InstrumentCode) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(instrument.clone()).or_default().value())
    }

    /// Replaces the instrument's history with `candles`, without producing signals.
    pub async fn preseed(&self, instrument: &InstrumentCode, candles: &[Candle]) -> Result<usize> {
        let lock = self.lock_for(instrument);
        let _guard = lock.lock().await;
        let seeded = self
            .store
            .preseed(instrument, candles)
            .with_context(|| format!("failed to pre-seed {instrument}"))?;
        tracing::debug!(instrument = %instrument, bars = seeded, "Indicator history pre-seeded.");
        Ok(seeded)
    }

    /// Runs one validated sample through the full pipeline.
    pub async fn process(&self, sample: PriceSample) -> Result<PipelineOutcome> {
        let lock = self.lock_for(&sample.instrument);
        let _guard = lock.lock().await;
        self.process_locked(sample).await
    }

    /// Feeds the newest bar of a polled series.
    ///
    /// An instrument seen for the first time is pre-seeded with every bar but the newest.
    /// A newest bar that is not later than the last ingested timestamp is not ingested again;
    /// its close is still checked against stop-loss and take-profit.
    pub async fn ingest_poll(
        &self,
        instrument: &InstrumentCode,
        candles: &[Candle],
    ) -> Result<PollOutcome> {
        let Some((latest, earlier)) = candles.split_last() else {
            anyhow::bail!("empty candle series for {instrument}");
        };

        let lock = self.lock_for(instrument);
        let _guard = lock.lock().await;

        if !self.store.is_seeded(instrument) && !earlier.is_empty() {
            let seeded = self.store.preseed(instrument, earlier)?;
            tracing::info!(instrument = %instrument, bars = seeded, "Pre-seeded poll instrument on first sight.");
        }

        if let Some(last_seen) = self.store.last_timestamp(instrument) {
            if latest.time <= last_seen {
                let mut outcome = PipelineOutcome::default();
                if let Some(intent) = self.risk.on_price_update(instrument, latest.close, latest.time) {
                    self.execute(intent, &mut outcome).await;
                }
                return Ok(PollOutcome::Unchanged(outcome));
            }
        }

        let sample = PriceSample::from_candle(instrument.clone(), latest, FeedSource::Poll)?;
        Ok(PollOutcome::Ingested(self.process_locked(sample).await?))
    }

    async fn process_locked(&self, sample: PriceSample) -> Result<PipelineOutcome> {
        let mut outcome = PipelineOutcome::default();

        // --- 1. Indicators ---
        let snapshot = self.store.ingest(&sample)?;

        // --- 2. Signal ---
        let signal = self.strategy.evaluate(&snapshot);

        // --- 3. Protective exits take precedence over crossover signals ---
        if let Some(intent) = self.risk.on_price_update(&sample.instrument, sample.price, sample.timestamp) {
            if signal.kind != SignalKind::None {
                tracing::debug!(
                    instrument = %sample.instrument,
                    kind = ?signal.kind,
                    "Crossover signal superseded by protective exit."
                );
            }
            self.execute(intent, &mut outcome).await;
        } else if signal.kind != SignalKind::None {
            match self.risk.on_signal(&signal) {
                Ok(Some(intent)) => self.execute(intent, &mut outcome).await,
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    instrument = %sample.instrument,
                    kind = ?signal.kind,
                    error = %e,
                    "Signal vetoed by risk manager."
                ),
            }
        }

        outcome.signal = Some(signal);
        Ok(outcome)
    }

    async fn execute(&self, intent: OrderIntent, outcome: &mut PipelineOutcome) {
        match self.executor.execute(&intent).await {
            Ok(execution) => {
                outcome.closed_trade = self.risk.on_order_filled(&intent, &execution);
                outcome.execution = Some(execution);
            }
            Err(execution::Error::NoHoldings { .. }) => {
                self.risk.on_order_failed(&intent);
                self.risk.on_position_missing(&intent.instrument);
            }
            Err(e) => {
                tracing::warn!(
                    instrument = %intent.instrument,
                    side = ?intent.side,
                    error = %e,
                    "Order failed; position state left unchanged."
                );
                self.risk.on_order_failed(&intent);
            }
        }
        outcome.intent = Some(intent);
    }
}
