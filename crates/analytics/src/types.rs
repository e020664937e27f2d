// In crates/analytics/src/types.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cumulative realized net profit after a trade closes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonBreakdown {
    pub trades: u32,
    pub net_profit: Decimal,
}

/// Performance over a set of closed trades.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceReport {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,

    /// Sum of price differences times quantity, before fees.
    pub gross_profit: Decimal,
    pub total_fees: Decimal,
    pub net_profit: Decimal,
    /// Mean of the per-trade net profit rates, in percent.
    pub avg_net_profit_rate: f64,
    pub profit_factor: f64,
    /// Average net profit per trade.
    pub expectancy: Decimal,

    /// Largest fall of cumulative net profit from a previous peak.
    pub max_drawdown_absolute: Decimal,
    pub drawdown_duration_secs: i64,
    pub avg_holding_secs: f64,

    /// Keyed by exit reason (`StopLoss`, `TakeProfit`, ...).
    pub by_exit_reason: BTreeMap<String, ReasonBreakdown>,
}

impl PerformanceReport {
    pub fn new() -> Self {
        Self::default()
    }
}
