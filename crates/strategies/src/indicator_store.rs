// In crates/strategies/src/indicator_store.rs

use crate::types::IndicatorSettings;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::{Candle, IndicatorSnapshot, InstrumentCode, PriceSample};
use dashmap::DashMap;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use ta::Next;
use ta::indicators::SimpleMovingAverage as Sma;

/// RSI value reported until enough price changes exist to seed the averages.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Relative strength index with Wilder smoothing.
///
/// The first `period` price changes are averaged arithmetically to seed the gain/loss
/// averages; every later change is folded in as `(avg * (period - 1) + x) / period`.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_price: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(Error::InvalidWindow {
                name: "rsi_period",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(Self {
            period,
            prev_price: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    pub fn is_seeded(&self) -> bool {
        self.changes >= self.period
    }

    pub fn value(&self) -> f64 {
        if !self.is_seeded() {
            return NEUTRAL_RSI;
        }
        if self.avg_loss == 0.0 {
            return if self.avg_gain == 0.0 { NEUTRAL_RSI } else { 100.0 };
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Next<f64> for WilderRsi {
    type Output = f64;

    fn next(&mut self, price: f64) -> Self::Output {
        if let Some(prev) = self.prev_price {
            let change = price - prev;
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            let period = self.period as f64;

            self.changes = self.changes.saturating_add(1);
            if self.changes < self.period {
                self.gain_sum += gain;
                self.loss_sum += loss;
            } else if self.changes == self.period {
                self.avg_gain = (self.gain_sum + gain) / period;
                self.avg_loss = (self.loss_sum + loss) / period;
            } else {
                self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
                self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
            }
        }
        self.prev_price = Some(price);
        self.value()
    }
}

/// Rolling indicator state for a single instrument.
#[derive(Debug)]
struct IndicatorState {
    /// The last `long_window` prices, oldest first.
    prices: VecDeque<f64>,
    short_sma: Sma,
    long_sma: Sma,
    volume_sma: Sma,
    rsi: WilderRsi,
    short_ma: f64,
    long_ma: f64,
    volume_ma: f64,
    volumes_seen: usize,
    last_price: Decimal,
    last_volume: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl IndicatorState {
    fn new(settings: &IndicatorSettings) -> Result<Self> {
        Ok(Self {
            prices: VecDeque::with_capacity(settings.long_window + 1),
            short_sma: sma("short_window", settings.short_window)?,
            long_sma: sma("long_window", settings.long_window)?,
            volume_sma: sma("volume_ma_period", settings.volume_ma_period)?,
            rsi: WilderRsi::new(settings.rsi_period)?,
            short_ma: 0.0,
            long_ma: 0.0,
            volume_ma: 0.0,
            volumes_seen: 0,
            last_price: Decimal::ZERO,
            last_volume: 0.0,
            last_timestamp: None,
        })
    }

    fn push(
        &mut self,
        settings: &IndicatorSettings,
        price: f64,
        volume: f64,
        raw_price: Decimal,
        at: DateTime<Utc>,
    ) {
        self.prices.push_back(price);
        while self.prices.len() > settings.long_window {
            self.prices.pop_front();
        }

        self.short_ma = self.short_sma.next(price);
        self.long_ma = self.long_sma.next(price);
        self.volume_ma = self.volume_sma.next(volume);
        self.volumes_seen = self.volumes_seen.saturating_add(1);
        self.rsi.next(price);

        self.last_price = raw_price;
        self.last_volume = volume;
        self.last_timestamp = Some(at);
    }

    fn snapshot(&self, settings: &IndicatorSettings, instrument: &InstrumentCode) -> IndicatorSnapshot {
        let len = self.prices.len();
        let volume_ma = if self.volumes_seen >= settings.volume_ma_period {
            self.volume_ma
        } else {
            0.0
        };
        let volume_ratio = if volume_ma > 0.0 { self.last_volume / volume_ma } else { 0.0 };

        IndicatorSnapshot {
            instrument: instrument.clone(),
            price: self.last_price,
            volume: self.last_volume,
            timestamp: self.last_timestamp.unwrap_or_default(),
            history_len: len,
            short_ma: (len >= settings.short_window).then_some(self.short_ma),
            long_ma: (len >= settings.long_window).then_some(self.long_ma),
            rsi: self.rsi.value(),
            volume_ma,
            volume_ratio,
        }
    }
}

fn sma(name: &'static str, period: usize) -> Result<Sma> {
    Sma::new(period).map_err(|e| Error::InvalidWindow {
        name,
        reason: format!("{e:?}"),
    })
}

fn to_f64(instrument: &InstrumentCode, value: Decimal) -> Result<f64> {
    value.to_f64().ok_or_else(|| Error::NonFinite {
        instrument: instrument.to_string(),
        value: value.to_string(),
    })
}

/// Per-instrument bounded price/volume history and the indicators derived from it.
///
/// Each instrument's state lives in its own map shard entry, so ingests for different
/// instruments never contend. Callers serialize ingests for the same instrument.
#[derive(Debug)]
pub struct IndicatorStore {
    settings: IndicatorSettings,
    states: DashMap<InstrumentCode, IndicatorState>,
}

impl IndicatorStore {
    pub fn new(settings: IndicatorSettings) -> Result<Self> {
        if settings.short_window == 0 || settings.short_window > settings.long_window {
            return Err(Error::InvalidWindow {
                name: "short_window",
                reason: format!(
                    "must be between 1 and long_window ({}), got {}",
                    settings.long_window, settings.short_window
                ),
            });
        }
        // Surface bad periods now rather than on the first ingest.
        IndicatorState::new(&settings)?;
        Ok(Self {
            settings,
            states: DashMap::new(),
        })
    }

    pub fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    /// Appends a sample to the instrument's history and returns the refreshed indicators.
    pub fn ingest(&self, sample: &PriceSample) -> Result<IndicatorSnapshot> {
        let price = to_f64(&sample.instrument, sample.price)?;
        let volume = to_f64(&sample.instrument, sample.volume)?;

        let mut state = match self.states.get_mut(&sample.instrument) {
            Some(state) => state,
            None => self
                .states
                .entry(sample.instrument.clone())
                .or_insert(IndicatorState::new(&self.settings)?),
        };
        state.push(&self.settings, price, volume, sample.price, sample.timestamp);
        Ok(state.snapshot(&self.settings, &sample.instrument))
    }

    /// Rebuilds an instrument's state from a historical series, discarding whatever was
    /// held before. Returns the number of bars ingested.
    pub fn preseed(&self, instrument: &InstrumentCode, candles: &[Candle]) -> Result<usize> {
        let mut state = IndicatorState::new(&self.settings)?;
        for candle in candles {
            let price = to_f64(instrument, candle.close)?;
            let volume = to_f64(instrument, candle.volume)?;
            state.push(&self.settings, price, volume, candle.close, candle.time);
        }
        self.states.insert(instrument.clone(), state);
        tracing::debug!(%instrument, bars = candles.len(), "Pre-seeded indicator history.");
        Ok(candles.len())
    }

    pub fn is_seeded(&self, instrument: &InstrumentCode) -> bool {
        self.states
            .get(instrument)
            .is_some_and(|state| !state.prices.is_empty())
    }

    /// Timestamp of the most recent sample ingested for the instrument.
    pub fn last_timestamp(&self, instrument: &InstrumentCode) -> Option<DateTime<Utc>> {
        self.states.get(instrument).and_then(|state| state.last_timestamp)
    }

    pub fn history_len(&self, instrument: &InstrumentCode) -> usize {
        self.states.get(instrument).map_or(0, |state| state.prices.len())
    }

    pub fn snapshot(&self, instrument: &InstrumentCode) -> Option<IndicatorSnapshot> {
        self.states
            .get(instrument)
            .map(|state| state.snapshot(&self.settings, instrument))
    }

    pub fn instruments(&self) -> usize {
        self.states.len()
    }
}
