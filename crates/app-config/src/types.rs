// In crates/app-config/src/types.rs

use chrono::NaiveTime;
use core_types::{Instrument, InstrumentCode};
use risk::types::{FeeSettings, RiskSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strategies::types::{IndicatorSettings, SignalFilterSettings};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// The instrument universe, in priority order for the live feed.
    pub universe: UniverseSettings,
    #[serde(default)]
    pub indicators: IndicatorSettings,
    #[serde(default)]
    pub signal_filters: SignalFilterSettings,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub fees: FeeSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub resilience: ResilienceSettings,
    /// Trading hours. When absent the engine runs around the clock.
    #[serde(default)]
    pub session: Option<SessionSettings>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Settings {
    /// Enabled instruments, in configured order.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.universe
            .instruments
            .iter()
            .filter(|i| i.enabled)
            .map(|i| Instrument {
                code: InstrumentCode(i.code.trim().to_string()),
                name: i.name.clone(),
                market: i.market.clone(),
            })
            .collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Route orders to the brokerage instead of the paper executor.
    #[serde(default)]
    pub live_trading_enabled: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UniverseSettings {
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

/// Configuration for a single instrument.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InstrumentConfig {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Rate-limited polling of the instruments that do not fit on the live feed.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BatchSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between two instrument calls.
    #[serde(default = "default_api_delay_ms")]
    pub api_delay_ms: u64,
    /// Pause between two batches.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Wall-clock interval between polling cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_candle_period_minutes")]
    pub candle_period_minutes: u32,
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,
    /// Extra attempts for a failed candle fetch within one cycle.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    /// Wait before retry `n` is `n * retry_delay_ms`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            api_delay_ms: default_api_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            candle_period_minutes: default_candle_period_minutes(),
            candle_count: default_candle_count(),
            fetch_retries: default_fetch_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BatchSettings {
    pub fn api_delay(&self) -> Duration {
        Duration::from_millis(self.api_delay_ms)
    }
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Live feed capacity, staleness detection and reconnect policy.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ResilienceSettings {
    /// Maximum concurrent live subscriptions the transport allows.
    #[serde(default = "default_max_live_instruments")]
    pub max_live_instruments: usize,
    #[serde(default = "default_staleness_timeout_secs")]
    pub staleness_timeout_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// The attempt counter wraps back to 1 after this many attempts.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Consecutive healthy checks after which the attempt counter resets.
    #[serde(default = "default_reset_after_successes")]
    pub reset_after_successes: u32,
    /// Consecutive failed reconnects that escalate to a full re-initialization.
    #[serde(default = "default_full_reinit_after_failures")]
    pub full_reinit_after_failures: u32,
    /// Upper bound for any single gateway call.
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
    /// Pushed ticks buffered between the gateway callback and the pipeline.
    #[serde(default = "default_live_queue_capacity")]
    pub live_queue_capacity: usize,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_live_instruments: default_max_live_instruments(),
            staleness_timeout_secs: default_staleness_timeout_secs(),
            check_interval_secs: default_check_interval_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reset_after_successes: default_reset_after_successes(),
            full_reinit_after_failures: default_full_reinit_after_failures(),
            gateway_timeout_ms: default_gateway_timeout_ms(),
            live_queue_capacity: default_live_queue_capacity(),
        }
    }
}

impl ResilienceSettings {
    pub fn staleness_timeout(&self) -> Duration {
        Duration::from_secs(self.staleness_timeout_secs)
    }
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// Exchange trading hours, in exchange-local time.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionSettings {
    #[serde(default = "default_market_open")]
    pub open: NaiveTime,
    #[serde(default = "default_market_close")]
    pub close: NaiveTime,
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_enabled")]
    pub weekdays_only: bool,
}

/// Parameters for paper sessions and synthetic backtests.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_volatility_pct")]
    pub volatility_pct: f64,
    #[serde(default = "default_spike_probability")]
    pub spike_probability: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Paper fill slippage, in percent.
    #[serde(default)]
    pub slippage_pct: f64,
    #[serde(default = "default_backtest_bars")]
    pub backtest_bars: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            volatility_pct: default_volatility_pct(),
            spike_probability: default_spike_probability(),
            tick_interval_ms: default_tick_interval_ms(),
            slippage_pct: 0.0,
            backtest_bars: default_backtest_bars(),
        }
    }
}

/// Helper functions for serde defaults
fn default_log_level() -> String { "info".to_string() }
fn default_enabled() -> bool { true }
fn default_batch_size() -> usize { 3 }
fn default_api_delay_ms() -> u64 { 500 }
fn default_batch_delay_ms() -> u64 { 2_000 }
fn default_poll_interval_secs() -> u64 { 60 }
fn default_candle_period_minutes() -> u32 { 10 }
fn default_candle_count() -> usize { 100 }
fn default_fetch_retries() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 2_000 }
fn default_max_live_instruments() -> usize { 40 }
fn default_staleness_timeout_secs() -> u64 { 60 }
fn default_check_interval_secs() -> u64 { 10 }
fn default_backoff_base_secs() -> u64 { 2 }
fn default_backoff_cap_secs() -> u64 { 60 }
fn default_max_reconnect_attempts() -> u32 { 10 }
fn default_reset_after_successes() -> u32 { 3 }
fn default_full_reinit_after_failures() -> u32 { 5 }
fn default_gateway_timeout_ms() -> u64 { 5_000 }
fn default_live_queue_capacity() -> usize { 4_096 }
fn default_market_open() -> NaiveTime { NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default() }
fn default_market_close() -> NaiveTime { NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default() }
fn default_utc_offset_minutes() -> i32 { 540 }
fn default_seed() -> u64 { 7 }
fn default_volatility_pct() -> f64 { 0.4 }
fn default_spike_probability() -> f64 { 0.1 }
fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_backtest_bars() -> usize { 2_000 }
