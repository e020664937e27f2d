// In crates/execution/src/simulated.rs

use crate::types::SimulationSettings;
use crate::{Error, Executor, Result};
use async_trait::async_trait;
use core_types::{Execution, OrderIntent, Side};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU64, Ordering};

/// Paper executor: fills every intent immediately at its reference price, moved against
/// the order by the configured slippage.
#[derive(Debug)]
pub struct SimulatedExecutor {
    slippage: Decimal,
    next_id: AtomicU64,
}

impl SimulatedExecutor {
    pub fn new(settings: SimulationSettings) -> Result<Self> {
        let slippage = Decimal::from_f64(settings.slippage_pct)
            .filter(|s| *s >= Decimal::ZERO)
            .ok_or_else(|| Error::ExecutionFailed {
                reason: format!("invalid slippage_pct {}", settings.slippage_pct),
            })?
            / dec!(100);
        Ok(Self { slippage, next_id: AtomicU64::new(1) })
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    fn name(&self) -> &'static str {
        "SimulatedExecutor"
    }

    async fn execute(&self, intent: &OrderIntent) -> Result<Execution> {
        if intent.quantity == 0 {
            return Err(Error::ExecutionFailed { reason: "zero quantity".to_string() });
        }

        // --- Calculate Execution Price with Slippage ---
        let price = match intent.side {
            Side::Buy => intent.reference_price * (Decimal::ONE + self.slippage),
            Side::Sell => intent.reference_price * (Decimal::ONE - self.slippage),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let execution = Execution {
            order_id: format!("PAPER-{id:06}"),
            instrument: intent.instrument.clone(),
            side: intent.side,
            price,
            quantity: intent.quantity,
            executed_at: intent.created_at,
        };
        tracing::debug!(?execution, "Simulated fill.");
        Ok(execution)
    }
}
