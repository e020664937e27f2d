// In crates/engine/src/supervisor.rs

use crate::session::{self, MarketSession};
use app_config::ResilienceSettings;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Liveness of the pushed-price connection.
///
/// The live feed records every delivered event. Everything else is written only by the
/// `ConnectionSupervisor`.
#[derive(Debug)]
pub struct ConnectionHealth {
    origin: Instant,
    /// Milliseconds since `origin` of the most recent event.
    last_event_ms: AtomicU64,
    events: AtomicU64,
    reconnect_attempt: AtomicU32,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_event_ms: AtomicU64::new(0),
            events: AtomicU64::new(0),
            reconnect_attempt: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn record_event(&self) {
        self.last_event_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last event, or since creation if nothing arrived yet.
    pub fn since_last_event(&self) -> Duration {
        let last = self.last_event_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.elapsed_ms().saturating_sub(last))
    }

    pub fn events_received(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Treats a completed reconnect as fresh activity, so the next check starts a new
    /// staleness window.
    fn touch(&self) {
        self.last_event_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }
}

/// `base * 2^(attempt - 1)`, capped. Attempt 0 is treated as 1.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.max(1) - 1;
    2u32.checked_pow(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |delay| delay.min(cap))
}

/// The operations the supervisor needs from a live feed.
#[async_trait]
pub trait LiveFeedControl: Send + Sync {
    async fn unsubscribe_all(&self);

    /// Subscribes every instrument not currently subscribed. Fails if any subscription fails.
    async fn subscribe_all(&self) -> anyhow::Result<usize>;

    /// Tears everything down, refreshes indicator history and subscribes again.
    async fn reinitialize(&self) -> anyhow::Result<()>;
}

/// What a single supervision check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    OutsideSession,
    Healthy,
    Reconnected { attempt: u32, delay: Duration },
    ReconnectFailed { attempt: u32, delay: Duration, consecutive_failures: u32 },
    Reinitialized,
    ReinitializeFailed,
    Cancelled,
}

/// Watches `ConnectionHealth` and rebuilds the live subscriptions when the feed goes quiet.
pub struct ConnectionSupervisor<F: LiveFeedControl> {
    feed: Arc<F>,
    health: Arc<ConnectionHealth>,
    settings: ResilienceSettings,
    session: Option<MarketSession>,
}

impl<F: LiveFeedControl> ConnectionSupervisor<F> {
    pub fn new(
        feed: Arc<F>,
        health: Arc<ConnectionHealth>,
        settings: ResilienceSettings,
        session: Option<MarketSession>,
    ) -> Self {
        Self { feed, health, settings, session }
    }

    pub fn health(&self) -> &Arc<ConnectionHealth> {
        &self.health
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            staleness_timeout = ?self.settings.staleness_timeout(),
            check_interval = ?self.settings.check_interval(),
            "Connection supervisor started."
        );
        let mut ticker = tokio::time::interval(self.settings.check_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the feed gets one interval to start.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if self.check_once(&shutdown).await == SupervisorAction::Cancelled {
                        break;
                    }
                }
            }
        }
        tracing::info!("Connection supervisor stopped.");
    }

    /// Performs one staleness check and, if needed, one reconnect.
    pub async fn check_once(&self, shutdown: &CancellationToken) -> SupervisorAction {
        if !session::is_trading(self.session.as_ref(), Utc::now()) {
            return SupervisorAction::OutsideSession;
        }

        let h = &self.health;
        let idle = h.since_last_event();
        if idle <= self.settings.staleness_timeout() {
            let successes = h.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
            if successes >= self.settings.reset_after_successes && h.reconnect_attempt() > 0 {
                tracing::info!(successes, "Live feed stable again; resetting reconnect counter.");
                h.reconnect_attempt.store(0, Ordering::Relaxed);
            }
            return SupervisorAction::Healthy;
        }

        // --- 1. Stale: pick the next attempt ---
        h.consecutive_successes.store(0, Ordering::Relaxed);
        let mut attempt = h.reconnect_attempt() + 1;
        if attempt > self.settings.max_reconnect_attempts {
            tracing::warn!(
                max_attempts = self.settings.max_reconnect_attempts,
                "Reconnect attempt budget exhausted; starting over."
            );
            attempt = 1;
        }
        h.reconnect_attempt.store(attempt, Ordering::Relaxed);
        let delay = backoff_delay(attempt, self.settings.backoff_base(), self.settings.backoff_cap());
        tracing::warn!(?idle, attempt, ?delay, "Live feed stale; reconnecting.");

        // --- 2. Drop the old subscriptions and back off ---
        self.feed.unsubscribe_all().await;
        tokio::select! {
            _ = shutdown.cancelled() => return SupervisorAction::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }

        // --- 3. Resubscribe ---
        match self.feed.subscribe_all().await {
            Ok(count) => {
                h.consecutive_failures.store(0, Ordering::Relaxed);
                h.touch();
                tracing::info!(attempt, subscriptions = count, "Live feed reconnected.");
                SupervisorAction::Reconnected { attempt, delay }
            }
            Err(e) => {
                let failures = h.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(attempt, failures, error = %e, "Reconnect failed.");
                if failures < self.settings.full_reinit_after_failures {
                    return SupervisorAction::ReconnectFailed { attempt, delay, consecutive_failures: failures };
                }

                // --- 4. Escalate ---
                tracing::error!(failures, "Repeated reconnect failures; re-initializing live feed.");
                h.consecutive_failures.store(0, Ordering::Relaxed);
                match self.feed.reinitialize().await {
                    Ok(()) => {
                        h.touch();
                        tracing::info!("Live feed re-initialized.");
                        SupervisorAction::Reinitialized
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Full re-initialization failed.");
                        SupervisorAction::ReinitializeFailed
                    }
                }
            }
        }
    }
}
