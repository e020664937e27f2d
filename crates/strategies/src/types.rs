// In crates/strategies/src/types.rs

use serde::{Deserialize, Serialize};

/// Window lengths for the rolling indicators.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndicatorSettings {
    #[serde(default = "default_short_window")]
    pub short_window: usize,
    /// Also the capacity of the per-instrument price history.
    #[serde(default = "default_long_window")]
    pub long_window: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_volume_ma_period")]
    pub volume_ma_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            short_window: default_short_window(),
            long_window: default_long_window(),
            rsi_period: default_rsi_period(),
            volume_ma_period: default_volume_ma_period(),
        }
    }
}

fn default_short_window() -> usize {
    20
}
fn default_long_window() -> usize {
    60
}
fn default_rsi_period() -> usize {
    14
}
fn default_volume_ma_period() -> usize {
    20
}

/// Noise filters applied to a crossover before it is allowed to fire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SignalFilterSettings {
    #[serde(default = "enabled")]
    pub use_ma_gap_filter: bool,
    #[serde(default = "default_min_ma_gap_pct")]
    pub min_ma_gap_pct: f64,

    #[serde(default = "enabled")]
    pub use_volume_filter: bool,
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: f64,

    /// Zero disables the cooldown.
    #[serde(default = "default_signal_cooldown_minutes")]
    pub signal_cooldown_minutes: u64,

    #[serde(default = "enabled")]
    pub use_rsi_filter: bool,
    #[serde(default = "default_rsi_buy_max")]
    pub rsi_buy_max: f64,
    #[serde(default = "default_rsi_sell_min")]
    pub rsi_sell_min: f64,
}

impl Default for SignalFilterSettings {
    fn default() -> Self {
        Self {
            use_ma_gap_filter: true,
            min_ma_gap_pct: default_min_ma_gap_pct(),
            use_volume_filter: true,
            volume_multiplier: default_volume_multiplier(),
            signal_cooldown_minutes: default_signal_cooldown_minutes(),
            use_rsi_filter: true,
            rsi_buy_max: default_rsi_buy_max(),
            rsi_sell_min: default_rsi_sell_min(),
        }
    }
}

fn enabled() -> bool {
    true
}
fn default_min_ma_gap_pct() -> f64 {
    0.1
}
fn default_volume_multiplier() -> f64 {
    1.5
}
fn default_signal_cooldown_minutes() -> u64 {
    5
}
fn default_rsi_buy_max() -> f64 {
    65.0
}
fn default_rsi_sell_min() -> f64 {
    35.0
}
