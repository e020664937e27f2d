// In crates/execution/src/live.rs

use crate::{Error, Executor, Result};
use api_client::MarketGateway;
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Execution, OrderIntent, Side};
use std::sync::Arc;

/// An executor that places market orders through the brokerage gateway.
///
/// Before each order the broker's holdings are checked: a BUY for something already held
/// is refused, and a SELL is clamped to the held quantity (or refused when nothing is held).
#[derive(Clone)]
pub struct LiveExecutor {
    gateway: Arc<dyn MarketGateway>,
}

impl LiveExecutor {
    pub fn new(gateway: Arc<dyn MarketGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Executor for LiveExecutor {
    fn name(&self) -> &'static str {
        "LiveExecutor"
    }

    async fn execute(&self, intent: &OrderIntent) -> Result<Execution> {
        tracing::info!(?intent, "Executing live order intent...");

        // --- Step 1: Reconcile against broker holdings ---
        let held = self.gateway.get_open_quantity(&intent.instrument).await?;
        let quantity = match intent.side {
            Side::Buy if held > 0 => {
                return Err(Error::AlreadyHeld {
                    instrument: intent.instrument.to_string(),
                    quantity: held,
                });
            }
            Side::Buy => intent.quantity,
            Side::Sell if held == 0 => {
                return Err(Error::NoHoldings { instrument: intent.instrument.to_string() });
            }
            Side::Sell => intent.quantity.min(held),
        };

        // --- Step 2: Place the market order ---
        let handle = self
            .gateway
            .place_order(&intent.instrument, intent.side, quantity, None)
            .await?;

        if handle.filled_quantity == 0 {
            return Err(Error::ExecutionFailed {
                reason: format!("order {} reported no fill", handle.order_id),
            });
        }

        let execution = Execution {
            order_id: handle.order_id,
            instrument: intent.instrument.clone(),
            side: intent.side,
            price: handle.filled_price.unwrap_or(intent.reference_price),
            quantity: handle.filled_quantity,
            executed_at: Utc::now(),
        };
        tracing::info!(?execution, "Live order filled.");
        Ok(execution)
    }
}
