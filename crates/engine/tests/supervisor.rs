// In crates/engine/tests/supervisor.rs

use app_config::ResilienceSettings;
use async_trait::async_trait;
use engine::{ConnectionHealth, ConnectionSupervisor, LiveFeedControl, SupervisorAction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeFeed {
    fail_subscribe: AtomicBool,
    unsubscribes: AtomicUsize,
    subscribes: AtomicUsize,
    reinits: AtomicUsize,
}

#[async_trait]
impl LiveFeedControl for FakeFeed {
    async fn unsubscribe_all(&self) {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }

    async fn subscribe_all(&self) -> anyhow::Result<usize> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            anyhow::bail!("transport refused the subscription");
        }
        Ok(3)
    }

    async fn reinitialize(&self) -> anyhow::Result<()> {
        self.reinits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn settings() -> ResilienceSettings {
    ResilienceSettings {
        staleness_timeout_secs: 60,
        backoff_base_secs: 2,
        backoff_cap_secs: 60,
        max_reconnect_attempts: 10,
        reset_after_successes: 3,
        full_reinit_after_failures: 5,
        ..ResilienceSettings::default()
    }
}

fn supervisor(feed: &Arc<FakeFeed>, settings: ResilienceSettings) -> ConnectionSupervisor<FakeFeed> {
    ConnectionSupervisor::new(feed.clone(), Arc::new(ConnectionHealth::new()), settings, None)
}

async fn go_stale() {
    tokio::time::advance(Duration::from_secs(61)).await;
}

#[tokio::test(start_paused = true)]
async fn fresh_feed_is_left_alone() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, settings());

    assert_eq!(sup.check_once(&CancellationToken::new()).await, SupervisorAction::Healthy);
    assert_eq!(feed.unsubscribes.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double_per_attempt() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, settings());
    let token = CancellationToken::new();

    for (attempt, secs) in [(1, 2), (2, 4), (3, 8), (4, 16)] {
        go_stale().await;
        let started = Instant::now();
        let action = sup.check_once(&token).await;
        assert_eq!(action, SupervisorAction::Reconnected { attempt, delay: Duration::from_secs(secs) });
        assert!(started.elapsed() >= Duration::from_secs(secs));
    }
    assert_eq!(feed.unsubscribes.load(Ordering::SeqCst), 4);
    assert_eq!(feed.subscribes.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn delay_is_capped() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, settings());
    let token = CancellationToken::new();

    let mut last = None;
    for _ in 0..6 {
        go_stale().await;
        last = Some(sup.check_once(&token).await);
    }
    assert_eq!(last, Some(SupervisorAction::Reconnected { attempt: 6, delay: Duration::from_secs(60) }));
}

#[tokio::test(start_paused = true)]
async fn attempt_counter_resets_after_consecutive_healthy_checks() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, settings());
    let token = CancellationToken::new();

    go_stale().await;
    sup.check_once(&token).await;
    go_stale().await;
    sup.check_once(&token).await;
    assert_eq!(sup.health().reconnect_attempt(), 2);

    for _ in 0..3 {
        sup.health().record_event();
        assert_eq!(sup.check_once(&token).await, SupervisorAction::Healthy);
    }
    assert_eq!(sup.health().reconnect_attempt(), 0);

    go_stale().await;
    assert_eq!(
        sup.check_once(&token).await,
        SupervisorAction::Reconnected { attempt: 1, delay: Duration::from_secs(2) }
    );
}

#[tokio::test(start_paused = true)]
async fn attempt_counter_wraps_after_the_budget() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, ResilienceSettings { max_reconnect_attempts: 3, ..settings() });
    let token = CancellationToken::new();

    let mut attempts = vec![];
    for _ in 0..4 {
        go_stale().await;
        if let SupervisorAction::Reconnected { attempt, .. } = sup.check_once(&token).await {
            attempts.push(attempt);
        }
    }
    assert_eq!(attempts, vec![1, 2, 3, 1]);
}

#[tokio::test(start_paused = true)]
async fn five_failed_reconnects_escalate_to_full_reinit() {
    let feed = Arc::new(FakeFeed::default());
    feed.fail_subscribe.store(true, Ordering::SeqCst);
    let sup = supervisor(&feed, settings());
    let token = CancellationToken::new();

    // A failed reconnect leaves the health timestamp alone, so every check sees a stale feed.
    go_stale().await;
    for failures in 1..=4 {
        let action = sup.check_once(&token).await;
        assert!(
            matches!(action, SupervisorAction::ReconnectFailed { consecutive_failures, .. } if consecutive_failures == failures),
            "{action:?}"
        );
    }
    assert_eq!(feed.reinits.load(Ordering::SeqCst), 0);

    assert_eq!(sup.check_once(&token).await, SupervisorAction::Reinitialized);
    assert_eq!(feed.reinits.load(Ordering::SeqCst), 1);
    assert_eq!(sup.health().consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_backoff_cancels_the_reconnect() {
    let feed = Arc::new(FakeFeed::default());
    let sup = supervisor(&feed, settings());
    let token = CancellationToken::new();
    token.cancel();

    go_stale().await;
    assert_eq!(sup.check_once(&token).await, SupervisorAction::Cancelled);
    assert_eq!(feed.subscribes.load(Ordering::SeqCst), 0);
}
