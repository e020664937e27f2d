// In crates/engine/src/lib.rs

pub mod live_feed;
pub mod pipeline;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod supervisor;

pub use live_feed::LiveFeedAdapter;
pub use pipeline::{Pipeline, PipelineOutcome, PollOutcome};
pub use router::{FeedPartition, partition};
pub use scheduler::{BatchPollScheduler, CycleReport};
pub use session::MarketSession;
pub use supervisor::{
    ConnectionHealth, ConnectionSupervisor, LiveFeedControl, SupervisorAction, backoff_delay,
};

use anyhow::Result;
use api_client::{CandlePeriod, MarketGateway, TimedGateway};
use app_config::Settings;
use execution::{Executor, LiveExecutor, SimulatedExecutor, SimulationSettings};
use futures::future;
use risk::{PositionManager, RiskManager};
use std::sync::Arc;
use strategies::{CrossoverDetector, IndicatorStore, Strategy};
use tokio_util::sync::CancellationToken;

/// Builds the store -> detector -> risk -> executor chain described by `settings`.
pub fn assemble_pipeline(settings: &Settings, executor: Arc<dyn Executor>) -> Result<Pipeline> {
    let store = IndicatorStore::new(settings.indicators.clone())?;
    let strategy: Arc<dyn Strategy> =
        Arc::new(CrossoverDetector::new(settings.signal_filters.clone()));
    let risk: Arc<dyn RiskManager> = Arc::new(PositionManager::new(
        settings.risk.clone(),
        &settings.fees,
        &settings.instruments(),
    )?);
    Ok(Pipeline::new(store, strategy, risk, executor))
}

/// Owns the shared pipeline and runs the live feed, the poll scheduler and the connection
/// supervisor side by side until shutdown.
pub struct Engine {
    settings: Settings,
    gateway: Arc<dyn MarketGateway>,
    pipeline: Arc<Pipeline>,
    partition: FeedPartition,
    session: Option<MarketSession>,
}

impl Engine {
    /// Assembles the engine. Every gateway call made through it is bounded by the
    /// configured timeout. Orders go to the brokerage only when live trading is enabled.
    pub fn new(settings: Settings, gateway: Arc<dyn MarketGateway>) -> Result<Self> {
        let gateway: Arc<dyn MarketGateway> =
            Arc::new(TimedGateway::new(gateway, settings.resilience.gateway_timeout()));
        let universe = settings.instruments();

        let executor: Arc<dyn Executor> = if settings.app.live_trading_enabled {
            tracing::warn!("Live trading enabled: orders will be sent to the brokerage.");
            Arc::new(LiveExecutor::new(Arc::clone(&gateway)))
        } else {
            Arc::new(SimulatedExecutor::new(SimulationSettings {
                slippage_pct: settings.simulation.slippage_pct,
            })?)
        };
        let pipeline = Arc::new(assemble_pipeline(&settings, executor)?);
        let partition = router::partition(&universe, settings.resilience.max_live_instruments);
        let session = settings.session.as_ref().map(MarketSession::from_settings).transpose()?;

        Ok(Self { settings, gateway, pipeline, partition, session })
    }

    pub fn partition(&self) -> &FeedPartition {
        &self.partition
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Runs until `shutdown` is cancelled, then releases every live subscription.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            live = self.partition.live.len(),
            poll = self.partition.poll.len(),
            gateway = self.gateway.name(),
            "Initializing engine..."
        );

        let mut handles = vec![];
        let mut live_feed = None;

        // --- 1. Live feed and its supervisor ---
        if !self.partition.live.is_empty() {
            let health = Arc::new(ConnectionHealth::new());
            let adapter = Arc::new(LiveFeedAdapter::new(
                Arc::clone(&self.gateway),
                Arc::clone(&self.pipeline),
                Arc::clone(&health),
                self.partition.live.clone(),
                CandlePeriod::Minutes(self.settings.batch.candle_period_minutes),
                self.settings.batch.candle_count,
                self.settings.resilience.live_queue_capacity,
            ));
            if let Err(e) = adapter.initialize().await {
                // The supervisor retries once the staleness timeout passes.
                tracing::error!(error = %e, "Live feed initialization incomplete.");
            }

            let consumer = Arc::clone(&adapter);
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move { consumer.run(token).await }));

            let supervisor = ConnectionSupervisor::new(
                Arc::clone(&adapter),
                health,
                self.settings.resilience.clone(),
                self.session.clone(),
            );
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move { supervisor.run(token).await }));
            live_feed = Some(adapter);
        }

        // --- 2. Batch poll scheduler ---
        if !self.partition.poll.is_empty() {
            let scheduler = BatchPollScheduler::new(
                Arc::clone(&self.gateway),
                Arc::clone(&self.pipeline),
                self.partition.poll.clone(),
                self.settings.batch.clone(),
                self.session.clone(),
            );
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move { scheduler.run(token).await }));
        }

        if handles.is_empty() {
            anyhow::bail!("No feeds were started. Check the configured universe.");
        }
        tracing::info!(count = handles.len(), "All engine tasks have been spawned.");

        // Every task exits on shutdown.
        let results = future::join_all(handles).await;
        for result in results {
            if let Err(e) = result {
                tracing::error!(error = %e, "Engine task terminated abnormally.");
            }
        }

        // --- 3. Release live subscriptions ---
        if let Some(adapter) = live_feed {
            adapter.unsubscribe_all().await;
        }
        tracing::info!(
            open_positions = self.pipeline.risk().open_positions(),
            "Engine stopped."
        );
        Ok(())
    }
}
