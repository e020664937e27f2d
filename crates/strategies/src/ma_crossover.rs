// In crates/strategies/src/ma_crossover.rs

use crate::Strategy;
use crate::types::SignalFilterSettings;
use chrono::{DateTime, Duration, Utc};
use core_types::{
    FilterRejection, IndicatorSnapshot, InstrumentCode, Regime, SignalEvent, SignalKind,
    SignalReason,
};
use dashmap::DashMap;

// Per-instrument crossover state.
#[derive(Debug, Default, Clone, Copy)]
struct CrossoverState {
    regime: Regime,
    last_fired: Option<DateTime<Utc>>,
}

/// Moving-average crossover classifier with noise filters.
///
/// A BUY fires only on a DEATH -> GOLDEN transition and a SELL only on GOLDEN -> DEATH.
/// The first valid observation of an instrument just records its regime. A transition
/// that fails a filter is suppressed and leaves the stored regime untouched, so the
/// crossover stays armed until a later snapshot passes every filter.
///
/// This differs from detectors that record the new regime before filtering, where a
/// suppressed crossover is dropped and only the next opposite transition can fire.
#[derive(Debug)]
pub struct CrossoverDetector {
    settings: SignalFilterSettings,
    states: DashMap<InstrumentCode, CrossoverState>,
}

impl CrossoverDetector {
    pub fn new(settings: SignalFilterSettings) -> Self {
        Self {
            settings,
            states: DashMap::new(),
        }
    }

    /// The regime last recorded for an instrument.
    pub fn regime(&self, instrument: &InstrumentCode) -> Regime {
        self.states
            .get(instrument)
            .map(|state| state.regime)
            .unwrap_or_default()
    }

    pub fn last_fired(&self, instrument: &InstrumentCode) -> Option<DateTime<Utc>> {
        self.states.get(instrument).and_then(|state| state.last_fired)
    }

    /// Applies the filters in order: MA gap, volume, cooldown, then momentum.
    fn check_filters(
        &self,
        kind: SignalKind,
        snapshot: &IndicatorSnapshot,
        last_fired: Option<DateTime<Utc>>,
    ) -> Result<(), FilterRejection> {
        let s = &self.settings;

        if s.use_ma_gap_filter {
            let gap_pct = snapshot.ma_gap_pct();
            if gap_pct < s.min_ma_gap_pct {
                return Err(FilterRejection::MaGap { gap_pct, min_pct: s.min_ma_gap_pct });
            }
        }

        if s.use_volume_filter && snapshot.volume_ratio < s.volume_multiplier {
            return Err(FilterRejection::Volume {
                ratio: snapshot.volume_ratio,
                min_ratio: s.volume_multiplier,
            });
        }

        if let Some(last) = last_fired {
            let required = Duration::minutes(s.signal_cooldown_minutes as i64);
            let elapsed = snapshot.timestamp - last;
            if elapsed < required {
                return Err(FilterRejection::Cooldown {
                    elapsed_secs: elapsed.num_seconds(),
                    required_secs: required.num_seconds(),
                });
            }
        }

        if s.use_rsi_filter {
            match kind {
                SignalKind::Buy if snapshot.rsi > s.rsi_buy_max => {
                    return Err(FilterRejection::Overbought { rsi: snapshot.rsi, ceiling: s.rsi_buy_max });
                }
                SignalKind::Sell if snapshot.rsi < s.rsi_sell_min => {
                    return Err(FilterRejection::Oversold { rsi: snapshot.rsi, floor: s.rsi_sell_min });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn event(snapshot: &IndicatorSnapshot, kind: SignalKind, reason: SignalReason) -> SignalEvent {
    SignalEvent {
        instrument: snapshot.instrument.clone(),
        kind,
        reason,
        snapshot: snapshot.clone(),
        timestamp: snapshot.timestamp,
    }
}

impl Strategy for CrossoverDetector {
    fn name(&self) -> &'static str {
        "MACrossover"
    }

    fn evaluate(&self, snapshot: &IndicatorSnapshot) -> SignalEvent {
        // 1. Both averages must be valid before the regime means anything.
        let Some(observed) = snapshot.regime() else {
            return event(snapshot, SignalKind::None, SignalReason::WarmingUp);
        };

        let mut state = self.states.entry(snapshot.instrument.clone()).or_default();

        // 2. Classify the transition.
        let (kind, reason) = match (state.regime, observed) {
            (Regime::Unset, _) => {
                state.regime = observed;
                tracing::debug!(instrument = %snapshot.instrument, regime = ?observed, "Recorded initial regime.");
                return event(snapshot, SignalKind::None, SignalReason::RegimeInitialized);
            }
            (Regime::Death, Regime::Golden) => (SignalKind::Buy, SignalReason::GoldenCross),
            (Regime::Golden, Regime::Death) => (SignalKind::Sell, SignalReason::DeathCross),
            _ => return event(snapshot, SignalKind::None, SignalReason::NoCrossover),
        };

        // 3. Filters. A rejection is logged and the crossover stays armed.
        if let Err(rejection) = self.check_filters(kind, snapshot, state.last_fired) {
            tracing::debug!(
                instrument = %snapshot.instrument,
                ?kind,
                ?rejection,
                "Signal suppressed by filter."
            );
            return event(snapshot, SignalKind::None, SignalReason::Suppressed(rejection));
        }

        // 4. Fire.
        state.regime = observed;
        state.last_fired = Some(snapshot.timestamp);
        tracing::info!(
            instrument = %snapshot.instrument,
            ?kind,
            price = %snapshot.price,
            short_ma = ?snapshot.short_ma,
            long_ma = ?snapshot.long_ma,
            rsi = snapshot.rsi,
            volume_ratio = snapshot.volume_ratio,
            "Signal fired."
        );
        event(snapshot, kind, reason)
    }
}
