// In crates/execution/src/types.rs

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimulationSettings {
    /// Simulated slippage for market orders, in percent of price (e.g., 0.05).
    #[serde(default)]
    pub slippage_pct: f64,
}
