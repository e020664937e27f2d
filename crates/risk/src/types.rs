// In crates/risk/src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RiskSettings {
    /// Stop-loss distance from entry, in percent. Negative (e.g. -1.0).
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Take-profit distance from entry, in percent.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// When set, `take_profit_pct` closes half the position and this level closes the rest.
    #[serde(default)]
    pub final_take_profit_pct: Option<f64>,
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    #[serde(default = "default_order_quantity")]
    pub order_quantity: u64,
    /// Defer crossover exits whose gross result would be eaten by fees.
    #[serde(default = "default_fee_aware_exits")]
    pub fee_aware_exits: bool,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            final_take_profit_pct: None,
            max_open_positions: default_max_open_positions(),
            order_quantity: default_order_quantity(),
            fee_aware_exits: default_fee_aware_exits(),
        }
    }
}

fn default_stop_loss_pct() -> f64 {
    -1.0
}
fn default_take_profit_pct() -> f64 {
    2.0
}
fn default_max_open_positions() -> usize {
    10
}
fn default_order_quantity() -> u64 {
    1
}
fn default_fee_aware_exits() -> bool {
    true
}

/// Transaction cost rates, all in percent of traded value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeeSettings {
    #[serde(default = "default_commission_pct")]
    pub commission_pct: f64,
    /// Transaction tax, charged on sells only.
    #[serde(default = "default_tax_pct")]
    pub tax_pct: f64,
    /// Expected slippage per side. Only affects the break-even rate.
    #[serde(default)]
    pub slippage_pct: f64,
    /// Tax overrides keyed by listing market (e.g. "KOSDAQ").
    #[serde(default)]
    pub market_tax_pct: HashMap<String, f64>,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            commission_pct: default_commission_pct(),
            tax_pct: default_tax_pct(),
            slippage_pct: 0.0,
            market_tax_pct: HashMap::new(),
        }
    }
}

fn default_commission_pct() -> f64 {
    0.015
}
fn default_tax_pct() -> f64 {
    0.18
}
