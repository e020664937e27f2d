// In crates/risk/src/position_manager.rs

use crate::fees::FeeBook;
use crate::types::{FeeSettings, RiskSettings};
use crate::{Error, Result, RiskManager};
use chrono::{DateTime, Utc};
use core_types::{
    ClosedTrade, Execution, ExitReason, Instrument, InstrumentCode, OrderIntent, OrderReason,
    Position, Side, SignalEvent, SignalKind,
};
use dashmap::DashMap;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-quantity position manager with stop-loss, (optionally staged) take-profit and
/// fee-aware crossover exits.
///
/// Entries reserve a slot against `max_open_positions` when the intent is emitted. The
/// position itself is only created once the fill is confirmed; a failed entry releases
/// the slot. Exits never touch the position until their fill is confirmed either.
#[derive(Debug)]
pub struct PositionManager {
    settings: RiskSettings,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    final_take_profit_pct: Option<Decimal>,
    fees: FeeBook,
    /// Listing market per instrument, for the tax lookup.
    markets: HashMap<InstrumentCode, String>,
    positions: DashMap<InstrumentCode, Position>,
    /// Open positions plus entries awaiting their fill.
    slots: AtomicUsize,
}

fn rate(name: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value)
        .filter(|_| value.is_finite())
        .ok_or_else(|| Error::InvalidParameters(format!("{name} is not a finite number: {value}")))
}

impl PositionManager {
    pub fn new(
        settings: RiskSettings,
        fee_settings: &FeeSettings,
        universe: &[Instrument],
    ) -> Result<Self> {
        let stop_loss_pct = rate("stop_loss_pct", settings.stop_loss_pct)?;
        let take_profit_pct = rate("take_profit_pct", settings.take_profit_pct)?;
        let final_take_profit_pct = settings
            .final_take_profit_pct
            .map(|v| rate("final_take_profit_pct", v))
            .transpose()?;

        if stop_loss_pct >= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "stop_loss_pct must be negative, got {stop_loss_pct}"
            )));
        }
        if take_profit_pct <= stop_loss_pct || take_profit_pct <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "take_profit_pct ({take_profit_pct}) must be positive and above stop_loss_pct ({stop_loss_pct})"
            )));
        }
        if final_take_profit_pct.is_some_and(|f| f <= take_profit_pct) {
            return Err(Error::InvalidParameters(
                "final_take_profit_pct must be above take_profit_pct".to_string(),
            ));
        }
        if settings.max_open_positions == 0 || settings.order_quantity == 0 {
            return Err(Error::InvalidParameters(
                "max_open_positions and order_quantity must be positive".to_string(),
            ));
        }

        let markets = universe
            .iter()
            .filter_map(|i| i.market.clone().map(|m| (i.code.clone(), m)))
            .collect();

        Ok(Self {
            settings,
            stop_loss_pct,
            take_profit_pct,
            final_take_profit_pct,
            fees: FeeBook::from_settings(fee_settings)?,
            markets,
            positions: DashMap::new(),
            slots: AtomicUsize::new(0),
        })
    }

    pub fn break_even_pct(&self, instrument: &InstrumentCode) -> Decimal {
        self.fees
            .for_market(self.markets.get(instrument).map(String::as_str))
            .break_even_pct()
    }

    fn level(entry: Decimal, pct: Decimal) -> Decimal {
        entry * (Decimal::ONE + pct / Decimal::ONE_HUNDRED)
    }

    fn try_reserve_slot(&self) -> bool {
        let max = self.settings.max_open_positions;
        self.slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    fn release_slot(&self) {
        let _ = self
            .slots
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)));
    }

    fn exit_intent(
        &self,
        position: &Position,
        quantity: u64,
        price: Decimal,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> OrderIntent {
        OrderIntent {
            instrument: position.instrument.clone(),
            side: Side::Sell,
            quantity,
            reference_price: price,
            reason: OrderReason::Exit(reason),
            created_at: at,
        }
    }

    fn on_buy(&self, signal: &SignalEvent) -> Result<Option<OrderIntent>> {
        if self.positions.contains_key(&signal.instrument) {
            return Err(Error::Vetoed {
                reason: format!("position already open for {}", signal.instrument),
            });
        }
        if !self.try_reserve_slot() {
            return Err(Error::Vetoed {
                reason: format!(
                    "max open positions reached ({})",
                    self.settings.max_open_positions
                ),
            });
        }

        Ok(Some(OrderIntent {
            instrument: signal.instrument.clone(),
            side: Side::Buy,
            quantity: self.settings.order_quantity,
            reference_price: signal.snapshot.price,
            reason: OrderReason::Entry,
            created_at: signal.timestamp,
        }))
    }

    fn on_sell(&self, signal: &SignalEvent) -> Option<OrderIntent> {
        let position = self.positions.get(&signal.instrument)?.clone();
        let price = signal.snapshot.price;
        let gross_pct = position.gross_pnl_pct(price);

        if self.settings.fee_aware_exits {
            let break_even = self.break_even_pct(&signal.instrument);
            let within_loss_band = gross_pct < Decimal::ZERO && gross_pct > self.stop_loss_pct;
            let below_break_even = gross_pct >= Decimal::ZERO && gross_pct < break_even;
            if within_loss_band || below_break_even {
                tracing::debug!(
                    instrument = %signal.instrument,
                    gross_pct = %gross_pct.round_dp(3),
                    break_even = %break_even,
                    "Deferring crossover exit; fees would dominate the result."
                );
                return None;
            }
        }

        Some(self.exit_intent(
            &position,
            position.quantity,
            price,
            ExitReason::Signal,
            signal.timestamp,
        ))
    }
}

impl RiskManager for PositionManager {
    fn name(&self) -> &'static str {
        "PositionManager"
    }

    fn on_signal(&self, signal: &SignalEvent) -> Result<Option<OrderIntent>> {
        match signal.kind {
            SignalKind::Buy => self.on_buy(signal),
            SignalKind::Sell => Ok(self.on_sell(signal)),
            SignalKind::None => Ok(None),
        }
    }

    fn on_price_update(
        &self,
        instrument: &InstrumentCode,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Option<OrderIntent> {
        let position = self.positions.get(instrument)?.clone();

        // Stop-loss first, with no fee consideration.
        if price <= position.stop_loss_price {
            tracing::warn!(
                %instrument,
                %price,
                stop_loss = %position.stop_loss_price,
                "Stop-loss triggered."
            );
            return Some(self.exit_intent(&position, position.quantity, price, ExitReason::StopLoss, at));
        }

        match position.final_take_profit_price {
            Some(final_price) if price >= final_price => Some(self.exit_intent(
                &position,
                position.quantity,
                price,
                ExitReason::TakeProfit,
                at,
            )),
            Some(_) if price >= position.take_profit_price && !position.partially_closed => {
                let half = position.quantity / 2;
                if half == 0 {
                    Some(self.exit_intent(&position, position.quantity, price, ExitReason::TakeProfit, at))
                } else {
                    Some(self.exit_intent(&position, half, price, ExitReason::PartialTakeProfit, at))
                }
            }
            None if price >= position.take_profit_price => Some(self.exit_intent(
                &position,
                position.quantity,
                price,
                ExitReason::TakeProfit,
                at,
            )),
            _ => None,
        }
    }

    fn on_order_filled(&self, intent: &OrderIntent, execution: &Execution) -> Option<ClosedTrade> {
        match intent.reason {
            OrderReason::Entry => {
                let entry = execution.price;
                let position = Position {
                    instrument: intent.instrument.clone(),
                    entry_price: entry,
                    quantity: execution.quantity,
                    entry_time: execution.executed_at,
                    stop_loss_price: Self::level(entry, self.stop_loss_pct),
                    take_profit_price: Self::level(entry, self.take_profit_pct),
                    final_take_profit_price: self.final_take_profit_pct.map(|p| Self::level(entry, p)),
                    partially_closed: false,
                };
                tracing::info!(
                    instrument = %position.instrument,
                    entry = %position.entry_price,
                    quantity = position.quantity,
                    stop_loss = %position.stop_loss_price,
                    take_profit = %position.take_profit_price,
                    "Position opened."
                );
                self.positions.insert(intent.instrument.clone(), position);
                None
            }
            OrderReason::Exit(reason) => {
                let mut entry = self.positions.get_mut(&intent.instrument)?;
                let fees = self
                    .fees
                    .for_market(self.markets.get(&intent.instrument).map(String::as_str));
                let sold = execution.quantity.min(entry.quantity);
                if sold == 0 {
                    return None;
                }
                let trade = fees.close(&entry, execution.price, sold, reason, execution.executed_at);

                // Shares still held keep their position, whatever the exit reason.
                let fully_closed = sold >= entry.quantity;
                if fully_closed {
                    drop(entry);
                    self.positions.remove(&intent.instrument);
                    self.release_slot();
                } else {
                    entry.quantity -= sold;
                    if reason == ExitReason::PartialTakeProfit {
                        entry.partially_closed = true;
                    }
                }

                tracing::info!(
                    instrument = %trade.instrument,
                    ?reason,
                    quantity = trade.quantity,
                    exit = %trade.exit_price,
                    net_profit = %trade.net_profit,
                    net_profit_rate = %trade.net_profit_rate,
                    fully_closed,
                    "Position closed."
                );
                Some(trade)
            }
        }
    }

    fn on_order_failed(&self, intent: &OrderIntent) {
        if intent.reason == OrderReason::Entry {
            self.release_slot();
        }
    }

    fn on_position_missing(&self, instrument: &InstrumentCode) {
        if self.positions.remove(instrument).is_some() {
            self.release_slot();
            tracing::warn!(%instrument, "Broker reports no holdings; dropping position record.");
        }
    }

    fn position(&self, instrument: &InstrumentCode) -> Option<Position> {
        self.positions.get(instrument).map(|p| p.clone())
    }

    fn open_positions(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::{IndicatorSnapshot, SignalReason};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 2, 1, 0, 0).unwrap()
    }

    fn manager(settings: RiskSettings, slippage_pct: f64) -> PositionManager {
        let fees = FeeSettings { commission_pct: 0.015, tax_pct: 0.18, slippage_pct, ..Default::default() };
        PositionManager::new(settings, &fees, &[]).unwrap()
    }

    fn signal(code: &str, kind: SignalKind, price: Decimal) -> SignalEvent {
        let snapshot = IndicatorSnapshot {
            instrument: code.into(),
            price,
            volume: 0.0,
            timestamp: t0(),
            history_len: 60,
            short_ma: Some(1.0),
            long_ma: Some(1.0),
            rsi: 50.0,
            volume_ma: 0.0,
            volume_ratio: 0.0,
        };
        let reason = if kind == SignalKind::Buy { SignalReason::GoldenCross } else { SignalReason::DeathCross };
        SignalEvent { instrument: code.into(), kind, reason, snapshot, timestamp: t0() }
    }

    fn fill(intent: &OrderIntent, price: Decimal) -> Execution {
        Execution {
            order_id: "test".to_string(),
            instrument: intent.instrument.clone(),
            side: intent.side,
            price,
            quantity: intent.quantity,
            executed_at: t0(),
        }
    }

    fn open(pm: &PositionManager, code: &str, entry: Decimal) {
        let intent = pm.on_signal(&signal(code, SignalKind::Buy, entry)).unwrap().unwrap();
        pm.on_order_filled(&intent, &fill(&intent, entry));
    }

    #[test]
    fn entry_sets_stop_and_take_profit_from_fill() {
        let pm = manager(RiskSettings { order_quantity: 10, ..Default::default() }, 0.0);
        open(&pm, "005930", dec!(10000));
        let pos = pm.position(&"005930".into()).unwrap();
        assert_eq!(pos.stop_loss_price, dec!(9900));
        assert_eq!(pos.take_profit_price, dec!(10200));
        assert_eq!(pos.quantity, 10);
    }

    #[test]
    fn stop_loss_fires_regardless_of_deferral() {
        let pm = manager(RiskSettings::default(), 0.075);
        open(&pm, "005930", dec!(10000));
        let code: InstrumentCode = "005930".into();

        // A crossover exit inside the loss band is deferred...
        assert!(pm.on_signal(&signal("005930", SignalKind::Sell, dec!(9950))).unwrap().is_none());
        assert!(pm.on_price_update(&code, dec!(9950), t0()).is_none());

        // ...but the stop-loss level always exits.
        let exit = pm.on_price_update(&code, dec!(9899), t0()).unwrap();
        assert_eq!(exit.reason, OrderReason::Exit(ExitReason::StopLoss));
        assert_eq!(exit.side, Side::Sell);
    }

    #[test]
    fn crossover_exit_waits_for_break_even() {
        let pm = manager(RiskSettings::default(), 0.075);
        open(&pm, "005930", dec!(10000));
        assert_eq!(pm.break_even_pct(&"005930".into()), dec!(0.36));

        let deferred = pm.on_signal(&signal("005930", SignalKind::Sell, dec!(10020))).unwrap();
        assert!(deferred.is_none());

        let exit = pm.on_signal(&signal("005930", SignalKind::Sell, dec!(10050))).unwrap().unwrap();
        assert_eq!(exit.reason, OrderReason::Exit(ExitReason::Signal));
        assert_eq!(exit.quantity, 1);
    }

    #[test]
    fn rejects_duplicate_entries_and_caps_open_positions() {
        let pm = manager(RiskSettings { max_open_positions: 2, ..Default::default() }, 0.0);
        open(&pm, "A", dec!(100));
        assert!(matches!(
            pm.on_signal(&signal("A", SignalKind::Buy, dec!(100))),
            Err(Error::Vetoed { .. })
        ));

        // Second slot is reserved by an unfilled entry.
        let pending = pm.on_signal(&signal("B", SignalKind::Buy, dec!(100))).unwrap().unwrap();
        assert!(pm.on_signal(&signal("C", SignalKind::Buy, dec!(100))).is_err());

        // A failed order leaves no position and frees the slot.
        pm.on_order_failed(&pending);
        assert!(pm.position(&"B".into()).is_none());
        assert!(pm.on_signal(&signal("C", SignalKind::Buy, dec!(100))).unwrap().is_some());
    }

    #[test]
    fn failed_exit_keeps_position() {
        let pm = manager(RiskSettings::default(), 0.0);
        open(&pm, "A", dec!(100));
        let exit = pm.on_price_update(&"A".into(), dec!(90), t0()).unwrap();
        pm.on_order_failed(&exit);
        assert!(pm.position(&"A".into()).is_some());
        assert_eq!(pm.open_positions(), 1);
    }

    #[test]
    fn take_profit_closes_and_reports_net_result() {
        let pm = manager(RiskSettings { order_quantity: 10, ..Default::default() }, 0.0);
        open(&pm, "005930", dec!(10000));
        let exit = pm.on_price_update(&"005930".into(), dec!(10300), t0()).unwrap();
        assert_eq!(exit.reason, OrderReason::Exit(ExitReason::TakeProfit));

        let trade = pm.on_order_filled(&exit, &fill(&exit, dec!(10300))).unwrap();
        assert_eq!(trade.net_profit, dec!(2784.15));
        assert_eq!(pm.open_positions(), 0);
    }

    #[test]
    fn staged_take_profit_sells_half_then_the_rest() {
        let settings = RiskSettings {
            order_quantity: 10,
            take_profit_pct: 2.0,
            final_take_profit_pct: Some(4.0),
            ..Default::default()
        };
        let pm = manager(settings, 0.0);
        open(&pm, "A", dec!(1000));
        let code: InstrumentCode = "A".into();

        let first = pm.on_price_update(&code, dec!(1021), t0()).unwrap();
        assert_eq!(first.reason, OrderReason::Exit(ExitReason::PartialTakeProfit));
        assert_eq!(first.quantity, 5);
        pm.on_order_filled(&first, &fill(&first, dec!(1021)));

        let pos = pm.position(&code).unwrap();
        assert!(pos.partially_closed);
        assert_eq!(pos.quantity, 5);
        assert!(pm.on_price_update(&code, dec!(1030), t0()).is_none());

        let last = pm.on_price_update(&code, dec!(1041), t0()).unwrap();
        assert_eq!(last.reason, OrderReason::Exit(ExitReason::TakeProfit));
        assert_eq!(last.quantity, 5);
        pm.on_order_filled(&last, &fill(&last, dec!(1041)));
        assert!(pm.position(&code).is_none());
    }

    #[test]
    fn short_stop_loss_fill_keeps_the_remainder_protected() {
        let pm = manager(RiskSettings { order_quantity: 10, ..Default::default() }, 0.0);
        open(&pm, "005930", dec!(10000));
        let code: InstrumentCode = "005930".into();

        let exit = pm.on_price_update(&code, dec!(9899), t0()).unwrap();
        assert_eq!(exit.quantity, 10);
        let short_fill = Execution { quantity: 4, ..fill(&exit, dec!(9899)) };
        let trade = pm.on_order_filled(&exit, &short_fill).unwrap();
        assert_eq!(trade.quantity, 4);

        let pos = pm.position(&code).unwrap();
        assert_eq!(pos.quantity, 6);
        assert!(!pos.partially_closed);
        assert_eq!(pm.open_positions(), 1);

        let again = pm.on_price_update(&code, dec!(9800), t0()).unwrap();
        assert_eq!(again.reason, OrderReason::Exit(ExitReason::StopLoss));
        assert_eq!(again.quantity, 6);
        pm.on_order_filled(&again, &fill(&again, dec!(9800)));
        assert!(pm.position(&code).is_none());
        assert_eq!(pm.open_positions(), 0);
    }

    #[test]
    fn rejects_take_profit_below_stop_loss() {
        let bad = RiskSettings { stop_loss_pct: -1.0, take_profit_pct: -2.0, ..Default::default() };
        assert!(PositionManager::new(bad, &FeeSettings::default(), &[]).is_err());
    }
}
