// In crates/app-config/src/validate.rs

use crate::types::Settings;
use crate::{Error, Result};
use core_types::InstrumentCode;
use std::collections::HashSet;

fn rate_ok(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl Settings {
    /// Rejects thresholds and parameters the engine cannot run with.
    ///
    /// Every problem found is reported, not just the first one.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        // --- Universe ---
        let mut seen = HashSet::new();
        for instrument in &self.universe.instruments {
            match InstrumentCode::parse(&instrument.code) {
                Ok(code) if !seen.insert(code.clone()) => {
                    problems.push(format!("duplicate instrument code '{code}'"));
                }
                Ok(_) => {}
                Err(e) => problems.push(e.to_string()),
            }
        }
        if self.instruments().is_empty() {
            problems.push("universe has no enabled instruments".to_string());
        }

        // --- Indicators ---
        let ind = &self.indicators;
        if ind.short_window == 0 || ind.long_window == 0 || ind.rsi_period == 0 || ind.volume_ma_period == 0 {
            problems.push("indicator windows must all be greater than zero".to_string());
        }
        if ind.short_window >= ind.long_window {
            problems.push(format!(
                "short_window ({}) must be shorter than long_window ({})",
                ind.short_window, ind.long_window
            ));
        }

        // --- Filters ---
        let f = &self.signal_filters;
        if !rate_ok(f.min_ma_gap_pct) || !rate_ok(f.volume_multiplier) {
            problems.push("min_ma_gap_pct and volume_multiplier must be non-negative".to_string());
        }
        let rsi_bounds = 0.0..=100.0;
        if !rsi_bounds.contains(&f.rsi_buy_max) || !rsi_bounds.contains(&f.rsi_sell_min) {
            problems.push("rsi_buy_max and rsi_sell_min must lie within [0, 100]".to_string());
        }

        // --- Risk ---
        let r = &self.risk;
        if !(r.stop_loss_pct.is_finite() && r.stop_loss_pct < 0.0) {
            problems.push(format!("stop_loss_pct must be negative, got {}", r.stop_loss_pct));
        }
        if !(r.take_profit_pct.is_finite() && r.take_profit_pct > 0.0) || r.take_profit_pct <= r.stop_loss_pct {
            problems.push(format!(
                "take_profit_pct ({}) must be positive and above stop_loss_pct ({})",
                r.take_profit_pct, r.stop_loss_pct
            ));
        }
        if let Some(final_tp) = r.final_take_profit_pct {
            if !(final_tp > r.take_profit_pct) {
                problems.push(format!(
                    "final_take_profit_pct ({final_tp}) must be above take_profit_pct ({})",
                    r.take_profit_pct
                ));
            }
        }
        if r.max_open_positions == 0 {
            problems.push("max_open_positions must be at least 1".to_string());
        }
        if r.order_quantity == 0 {
            problems.push("order_quantity must be at least 1".to_string());
        }

        // --- Fees ---
        let fees = &self.fees;
        if !rate_ok(fees.commission_pct) || !rate_ok(fees.tax_pct) || !rate_ok(fees.slippage_pct) {
            problems.push("fee rates must be non-negative".to_string());
        }
        for (market, tax) in &fees.market_tax_pct {
            if !rate_ok(*tax) {
                problems.push(format!("tax rate for market '{market}' must be non-negative"));
            }
        }

        // --- Batch polling ---
        let b = &self.batch;
        if b.batch_size == 0 {
            problems.push("batch_size must be at least 1".to_string());
        }
        if b.poll_interval_secs == 0 {
            problems.push("poll_interval_secs must be at least 1".to_string());
        }
        if b.candle_period_minutes == 0 {
            problems.push("candle_period_minutes must be at least 1".to_string());
        }
        if b.candle_count < ind.long_window + 1 {
            problems.push(format!(
                "candle_count ({}) must exceed long_window ({}) to seed the averages",
                b.candle_count, ind.long_window
            ));
        }

        // --- Resilience ---
        let res = &self.resilience;
        if res.max_live_instruments == 0 {
            problems.push("max_live_instruments must be at least 1".to_string());
        }
        if res.backoff_base_secs == 0 || res.backoff_cap_secs < res.backoff_base_secs {
            problems.push(format!(
                "backoff base ({}s) must be positive and not above the cap ({}s)",
                res.backoff_base_secs, res.backoff_cap_secs
            ));
        }
        if res.check_interval_secs == 0 || res.staleness_timeout_secs == 0 {
            problems.push("check_interval_secs and staleness_timeout_secs must be positive".to_string());
        }
        if res.max_reconnect_attempts == 0 || res.reset_after_successes == 0 || res.full_reinit_after_failures == 0 {
            problems.push("reconnect counters must be positive".to_string());
        }
        if res.gateway_timeout_ms == 0 || res.live_queue_capacity == 0 {
            problems.push("gateway_timeout_ms and live_queue_capacity must be positive".to_string());
        }

        // --- Session ---
        if let Some(session) = &self.session {
            if session.open >= session.close {
                problems.push(format!(
                    "session open ({}) must be before close ({})",
                    session.open, session.close
                ));
            }
            if session.utc_offset_minutes.abs() >= 24 * 60 {
                problems.push("session utc_offset_minutes must be within a day".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Invalid(problems))
        }
    }
}
