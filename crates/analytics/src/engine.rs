// In crates/analytics/src/engine.rs

use crate::types::{EquityPoint, PerformanceReport};
use chrono::Duration;
use core_types::ClosedTrade;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// The engine responsible for calculating performance metrics from trade data.
#[derive(Default)]
pub struct AnalyticsEngine;

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cumulative net profit, one point per trade in exit order.
    pub fn equity_curve(&self, trades: &[ClosedTrade]) -> Vec<EquityPoint> {
        let mut ordered: Vec<&ClosedTrade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.exit_time);

        let mut equity = Decimal::ZERO;
        ordered
            .into_iter()
            .map(|t| {
                equity += t.net_profit;
                EquityPoint { timestamp: t.exit_time, value: equity }
            })
            .collect()
    }

    /// Calculates a full performance report from a set of closed trades.
    pub fn calculate(&self, trades: &[ClosedTrade]) -> PerformanceReport {
        let mut report = PerformanceReport::new();
        if trades.is_empty() {
            return report;
        }
        let count = Decimal::from(trades.len());

        // 1. Totals
        report.total_trades = trades.len() as u32;
        report.gross_profit = trades.iter().map(|t| t.gross_profit).sum();
        report.total_fees = trades.iter().map(ClosedTrade::total_fees).sum();
        report.net_profit = trades.iter().map(|t| t.net_profit).sum();
        report.expectancy = (report.net_profit / count).round_dp(2);
        report.avg_net_profit_rate = (trades.iter().map(|t| t.net_profit_rate).sum::<Decimal>() / count)
            .to_f64()
            .unwrap_or(0.0);

        // 2. Win rate & profit factor, on net results
        report.wins = trades.iter().filter(|t| t.is_win()).count() as u32;
        report.losses = trades.iter().filter(|t| t.net_profit < dec!(0)).count() as u32;
        report.win_rate = f64::from(report.wins) / f64::from(report.total_trades) * 100.0;

        let won: Decimal = trades.iter().filter(|t| t.is_win()).map(|t| t.net_profit).sum();
        let lost: Decimal = trades
            .iter()
            .filter(|t| t.net_profit < dec!(0))
            .map(|t| t.net_profit)
            .sum::<Decimal>()
            .abs();
        report.profit_factor = if lost > dec!(0) {
            (won / lost).to_f64().unwrap_or(0.0)
        } else {
            f64::INFINITY // No losing trades
        };

        // 3. Drawdown on cumulative net profit, starting from flat
        let curve = self.equity_curve(trades);
        let mut peak = Decimal::ZERO;
        let mut peak_time = curve.first().map(|p| p.timestamp);
        let mut longest = Duration::zero();
        for point in &curve {
            if point.value >= peak {
                peak = point.value;
                peak_time = Some(point.timestamp);
            } else {
                report.max_drawdown_absolute = report.max_drawdown_absolute.max(peak - point.value);
                if let Some(since) = peak_time {
                    longest = longest.max(point.timestamp - since);
                }
            }
        }
        report.drawdown_duration_secs = longest.num_seconds();

        // 4. Holding time
        let held_secs: i64 = trades.iter().map(|t| (t.exit_time - t.entry_time).num_seconds()).sum();
        report.avg_holding_secs = held_secs as f64 / trades.len() as f64;

        // 5. Exit reasons
        for trade in trades {
            let entry = report.by_exit_reason.entry(format!("{:?}", trade.reason)).or_default();
            entry.trades += 1;
            entry.net_profit += trade.net_profit;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::ExitReason;

    fn trade(minute: i64, held_minutes: i64, net: Decimal, reason: ExitReason) -> ClosedTrade {
        let exit_time = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap() + Duration::minutes(minute);
        ClosedTrade {
            instrument: "005930".into(),
            reason,
            quantity: 1,
            entry_price: dec!(1000),
            exit_price: dec!(1000) + net,
            entry_time: exit_time - Duration::minutes(held_minutes),
            exit_time,
            gross_profit: net + dec!(2),
            buy_fee: dec!(1),
            sell_fee: dec!(1),
            net_profit: net,
            net_profit_rate: (net / dec!(10)).round_dp(2),
        }
    }

    #[test]
    fn empty_trade_list_gives_empty_report() {
        let report = AnalyticsEngine::new().calculate(&[]);
        assert_eq!(report.total_trades, 0);
        assert_eq!(report.net_profit, Decimal::ZERO);
    }

    #[test]
    fn aggregates_wins_losses_and_fees() {
        let trades = vec![
            trade(10, 10, dec!(30), ExitReason::TakeProfit),
            trade(20, 5, dec!(-10), ExitReason::StopLoss),
            trade(30, 15, dec!(-20), ExitReason::StopLoss),
            trade(40, 10, dec!(40), ExitReason::Signal),
        ];
        let report = AnalyticsEngine::new().calculate(&trades);

        assert_eq!(report.total_trades, 4);
        assert_eq!(report.wins, 2);
        assert_eq!(report.losses, 2);
        assert_eq!(report.win_rate, 50.0);
        assert_eq!(report.net_profit, dec!(40));
        assert_eq!(report.total_fees, dec!(8));
        assert_eq!(report.gross_profit, dec!(48));
        assert_eq!(report.expectancy, dec!(10));
        assert!((report.profit_factor - 70.0 / 30.0).abs() < 1e-9);
        assert_eq!(report.avg_holding_secs, 600.0);

        let stops = &report.by_exit_reason["StopLoss"];
        assert_eq!(stops.trades, 2);
        assert_eq!(stops.net_profit, dec!(-30));
    }

    #[test]
    fn drawdown_is_measured_from_the_running_peak() {
        // Equity: 30, 20, 0, 40.
        let trades = vec![
            trade(10, 1, dec!(30), ExitReason::TakeProfit),
            trade(20, 1, dec!(-10), ExitReason::StopLoss),
            trade(30, 1, dec!(-20), ExitReason::StopLoss),
            trade(40, 1, dec!(40), ExitReason::Signal),
        ];
        let report = AnalyticsEngine::new().calculate(&trades);
        assert_eq!(report.max_drawdown_absolute, dec!(30));
        assert_eq!(report.drawdown_duration_secs, 20 * 60);

        let curve = AnalyticsEngine::new().equity_curve(&trades);
        assert_eq!(curve.last().map(|p| p.value), Some(dec!(40)));
    }
}
