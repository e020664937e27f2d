// In crates/backtester/src/lib.rs

use analytics::{AnalyticsEngine, EquityPoint, PerformanceReport};
use chrono::{DateTime, Utc};
use core_types::{Candle, ClosedTrade, FeedSource, InstrumentCode, PriceSample, SignalKind};
use engine::Pipeline;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub report: PerformanceReport,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub bars_replayed: usize,
    pub signals_fired: usize,
    /// Positions still open when the data ran out.
    pub open_positions: usize,
}

/// Replays historical bars through the live pipeline: the same indicator store, crossover
/// detector, risk manager and (paper) executor.
pub struct Backtester {
    pipeline: Arc<Pipeline>,
}

impl Backtester {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Runs every bar of every instrument once, merged in time order. Bars sharing a
    /// timestamp are replayed in instrument-code order.
    pub async fn run(&self, series: BTreeMap<InstrumentCode, Vec<Candle>>) -> anyhow::Result<BacktestResult> {
        let mut bars: Vec<(DateTime<Utc>, &InstrumentCode, &Candle)> = series
            .iter()
            .flat_map(|(code, candles)| candles.iter().map(move |c| (c.time, code, c)))
            .collect();
        bars.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        tracing::info!(instruments = series.len(), bars = bars.len(), "Starting backtest replay.");

        let mut trades = Vec::new();
        let mut signals_fired = 0;
        for (_, code, candle) in &bars {
            let sample = match PriceSample::from_candle((*code).clone(), candle, FeedSource::Replay) {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!(instrument = %code, error = %e, "Skipping invalid bar.");
                    continue;
                }
            };
            let outcome = self.pipeline.process(sample).await?;
            if matches!(outcome.fired(), Some(SignalKind::Buy | SignalKind::Sell)) {
                signals_fired += 1;
            }
            if let Some(trade) = outcome.closed_trade {
                tracing::debug!(instrument = %trade.instrument, reason = ?trade.reason, net = %trade.net_profit, "Trade closed.");
                trades.push(trade);
            }
        }

        let analytics = AnalyticsEngine::new();
        let report = analytics.calculate(&trades);
        let equity_curve = analytics.equity_curve(&trades);
        let open_positions = self.pipeline.risk().open_positions();
        tracing::info!(
            trades = trades.len(),
            net_profit = %report.net_profit,
            open_positions,
            "Backtest finished."
        );

        Ok(BacktestResult {
            report,
            trades,
            equity_curve,
            bars_replayed: bars.len(),
            signals_fired,
            open_positions,
        })
    }
}

/// Helper function to print the performance report in a readable format.
pub fn print_report(result: &BacktestResult) {
    let report = &result.report;
    println!("\n--- Backtest Performance Report ---");
    println!("-----------------------------------");
    println!("Bars Replayed:         {}", result.bars_replayed);
    println!("Signals Fired:         {}", result.signals_fired);
    println!("Total Trades:          {}", report.total_trades);
    println!("Win Rate:              {:.2}%", report.win_rate);
    println!("Gross Profit:          {:.0}", report.gross_profit);
    println!("Total Fees:            {:.0}", report.total_fees);
    println!("Net Profit:            {:.0}", report.net_profit);
    println!("Avg. Net Rate:         {:.2}%", report.avg_net_profit_rate);
    println!("Profit Factor:         {:.2}", report.profit_factor);
    println!("Expectancy:            {:.2}", report.expectancy);
    println!("Max Drawdown:          {:.0}", report.max_drawdown_absolute);
    println!("Max Drawdown Duration: {}s", report.drawdown_duration_secs);
    println!("Avg. Holding Time:     {:.1}s", report.avg_holding_secs);
    println!("Open At End:           {}", result.open_positions);
    println!("-----------------------------------");

    if !report.by_exit_reason.is_empty() {
        println!("Exits by Reason:");
        for (reason, stats) in &report.by_exit_reason {
            println!("  - {reason}: Trades = {}, Net = {:.0}", stats.trades, stats.net_profit);
        }
        println!("-----------------------------------");
    }

    for trade in &result.trades {
        println!(
            "{} {:<8} {:?}: {} -> {} x{} net {:.0} ({}%)",
            trade.exit_time.format("%Y-%m-%d %H:%M"),
            trade.instrument,
            trade.reason,
            trade.entry_price,
            trade.exit_price,
            trade.quantity,
            trade.net_profit,
            trade.net_profit_rate,
        );
    }
}
