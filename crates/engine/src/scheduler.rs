// In crates/engine/src/scheduler.rs

use crate::pipeline::{Pipeline, PollOutcome};
use crate::session::{self, MarketSession};
use api_client::{CandlePeriod, MarketGateway};
use app_config::BatchSettings;
use chrono::Utc;
use core_types::{Candle, Instrument, InstrumentCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tally of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Size of each batch that was started.
    pub batch_sizes: Vec<usize>,
    pub inter_batch_delays: usize,
    pub ingested: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Polls the instruments that did not fit on the live feed, in rate-limited batches.
pub struct BatchPollScheduler {
    gateway: Arc<dyn MarketGateway>,
    pipeline: Arc<Pipeline>,
    instruments: Vec<Instrument>,
    settings: BatchSettings,
    session: Option<MarketSession>,
}

/// Sleeps for `duration` unless `shutdown` fires first. Returns false when cancelled.
async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl BatchPollScheduler {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        pipeline: Arc<Pipeline>,
        instruments: Vec<Instrument>,
        settings: BatchSettings,
        session: Option<MarketSession>,
    ) -> Self {
        Self { gateway, pipeline, instruments, settings, session }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Runs a cycle every poll interval until `shutdown` fires. Cycles are skipped while
    /// the market is closed.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            instruments = self.instruments.len(),
            batch_size = self.settings.batch_size,
            interval = ?self.settings.poll_interval(),
            "Batch poll scheduler started."
        );
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if !session::is_trading(self.session.as_ref(), Utc::now()) {
                        tracing::debug!("Market closed; skipping poll cycle.");
                        continue;
                    }
                    let report = self.run_cycle(&shutdown).await;
                    tracing::info!(
                        batches = report.batch_sizes.len(),
                        ingested = report.ingested,
                        unchanged = report.unchanged,
                        failed = report.failed,
                        "Poll cycle complete."
                    );
                    if report.cancelled {
                        break;
                    }
                }
            }
        }
        tracing::info!("Batch poll scheduler stopped.");
    }

    /// Visits every poll instrument once.
    ///
    /// Calls within a batch are separated by the API delay; batches by the batch delay,
    /// with no delay after the last batch. A failing instrument is skipped for this cycle.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        let batch_size = self.settings.batch_size.max(1);

        'batches: for (batch_index, batch) in self.instruments.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                if !pause(self.settings.batch_delay(), shutdown).await {
                    report.cancelled = true;
                    break 'batches;
                }
                report.inter_batch_delays += 1;
            }
            report.batch_sizes.push(batch.len());
            tracing::debug!(batch = batch_index + 1, size = batch.len(), "Polling batch.");

            for (i, instrument) in batch.iter().enumerate() {
                if i > 0 && !pause(self.settings.api_delay(), shutdown).await {
                    report.cancelled = true;
                    break 'batches;
                }
                match self.poll_instrument(&instrument.code, shutdown).await {
                    Ok(PollOutcome::Ingested(_)) => report.ingested += 1,
                    Ok(PollOutcome::Unchanged(_)) => report.unchanged += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(instrument = %instrument.code, error = %e, "Poll failed; skipping instrument this cycle.");
                    }
                }
            }
        }
        report
    }

    async fn poll_instrument(
        &self,
        instrument: &InstrumentCode,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<PollOutcome> {
        let candles = self.fetch_with_retry(instrument, shutdown).await?;
        self.pipeline.ingest_poll(instrument, &candles).await
    }

    async fn fetch_with_retry(
        &self,
        instrument: &InstrumentCode,
        shutdown: &CancellationToken,
    ) -> anyhow::Result<Vec<Candle>> {
        let period = CandlePeriod::Minutes(self.settings.candle_period_minutes);
        let mut attempt = 0;
        loop {
            let result = self
                .gateway
                .get_candles(instrument, period, self.settings.candle_count)
                .await;
            let error = match result {
                Ok(candles) if !candles.is_empty() => return Ok(candles),
                Ok(_) => anyhow::anyhow!("gateway returned no candles"),
                Err(e) => anyhow::Error::new(e),
            };
            if attempt >= self.settings.fetch_retries {
                return Err(error.context(format!(
                    "candle fetch for {instrument} failed after {} attempts",
                    attempt + 1
                )));
            }
            attempt += 1;
            let wait = self.settings.retry_delay() * attempt;
            tracing::debug!(instrument = %instrument, attempt, ?wait, error = %error, "Retrying candle fetch.");
            if !pause(wait, shutdown).await {
                anyhow::bail!("cancelled while retrying {instrument}");
            }
        }
    }
}
