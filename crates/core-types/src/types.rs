// In crates/core-types/src/types.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// A stable instrument identifier (e.g., "005930").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentCode(pub String);

impl InstrumentCode {
    /// Builds a code from user input, trimming whitespace and rejecting empty codes.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInstrument(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A tradable security in the configured universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: InstrumentCode,
    pub name: String,
    /// Listing market, used to pick the applicable transaction tax.
    #[serde(default)]
    pub market: Option<String>,
}

impl Instrument {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: InstrumentCode(code.into()),
            name: name.into(),
            market: None,
        }
    }
}

/// Which ingestion path produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedSource {
    Live,
    Poll,
    Replay,
}

/// A single observation of price and volume for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub instrument: InstrumentCode,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: FeedSource,
}

impl PriceSample {
    /// Validates the raw observation. Non-positive prices and negative volumes are rejected.
    pub fn new(
        instrument: InstrumentCode,
        price: Decimal,
        volume: Decimal,
        timestamp: DateTime<Utc>,
        source: FeedSource,
    ) -> Result<Self> {
        if price <= Decimal::ZERO {
            return Err(Error::InvalidSample {
                instrument: instrument.0,
                reason: format!("non-positive price {price}"),
            });
        }
        if volume < Decimal::ZERO {
            return Err(Error::InvalidSample {
                instrument: instrument.0,
                reason: format!("negative volume {volume}"),
            });
        }
        Ok(Self { instrument, price, volume, timestamp, source })
    }

    /// Builds a sample from the closing values of a bar.
    pub fn from_candle(
        instrument: InstrumentCode,
        candle: &Candle,
        source: FeedSource,
    ) -> Result<Self> {
        Self::new(instrument, candle.close, candle.volume, candle.time, source)
    }
}

/// One OHLCV bar. Series are always ordered by ascending `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Relationship between the short and long moving averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Regime {
    /// Short MA above long MA.
    Golden,
    /// Short MA at or below long MA.
    Death,
    #[default]
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    None,
}

/// The noise filter that suppressed a crossover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterRejection {
    MaGap { gap_pct: f64, min_pct: f64 },
    Volume { ratio: f64, min_ratio: f64 },
    Cooldown { elapsed_secs: i64, required_secs: i64 },
    Overbought { rsi: f64, ceiling: f64 },
    Oversold { rsi: f64, floor: f64 },
}

/// Why the detector produced the signal it did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalReason {
    /// Not enough history for both moving averages.
    WarmingUp,
    /// First valid observation; the regime was recorded without firing.
    RegimeInitialized,
    /// No regime change since the last fired signal.
    NoCrossover,
    GoldenCross,
    DeathCross,
    Suppressed(FilterRejection),
}

/// A read-only view of an instrument's indicators right after an ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub instrument: InstrumentCode,
    pub price: Decimal,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    /// Number of prices currently held (never more than the long window).
    pub history_len: usize,
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub rsi: f64,
    pub volume_ma: f64,
    pub volume_ratio: f64,
}

impl IndicatorSnapshot {
    /// Absolute distance between the moving averages as a percentage of the long MA.
    /// Defined as 0 when the long MA is zero or not yet valid.
    pub fn ma_gap_pct(&self) -> f64 {
        match (self.short_ma, self.long_ma) {
            (Some(short), Some(long)) if long != 0.0 => ((short - long) / long * 100.0).abs(),
            _ => 0.0,
        }
    }

    /// The regime implied by the current moving averages, if both are valid.
    pub fn regime(&self) -> Option<Regime> {
        match (self.short_ma, self.long_ma) {
            (Some(short), Some(long)) if short > long => Some(Regime::Golden),
            (Some(_), Some(_)) => Some(Regime::Death),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub instrument: InstrumentCode,
    pub kind: SignalKind,
    pub reason: SignalReason,
    pub snapshot: IndicatorSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Why a position was (or is being) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Half-size exit at the first take-profit level.
    PartialTakeProfit,
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderReason {
    Entry,
    Exit(ExitReason),
}

/// An order the risk manager wants placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: InstrumentCode,
    pub side: Side,
    pub quantity: u64,
    /// The price that triggered the intent; orders themselves go out at market.
    pub reference_price: Decimal,
    pub reason: OrderReason,
    pub created_at: DateTime<Utc>,
}

/// A confirmed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub order_id: String,
    pub instrument: InstrumentCode,
    pub side: Side,
    pub price: Decimal,
    pub quantity: u64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentCode,
    pub entry_price: Decimal,
    pub quantity: u64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    /// Set when the position scales out: `take_profit_price` then sells half.
    pub final_take_profit_price: Option<Decimal>,
    pub partially_closed: bool,
}

impl Position {
    /// Gross move from entry, in percent.
    pub fn gross_pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED
    }
}

/// A realized exit (full or partial) with its fee breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub instrument: InstrumentCode,
    pub reason: ExitReason,
    pub quantity: u64,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub gross_profit: Decimal,
    pub buy_fee: Decimal,
    pub sell_fee: Decimal,
    pub net_profit: Decimal,
    /// Net profit over entry value, in percent, rounded to 2 decimals.
    pub net_profit_rate: Decimal,
}

impl ClosedTrade {
    pub fn total_fees(&self) -> Decimal {
        self.buy_fee + self.sell_fee
    }

    pub fn is_win(&self) -> bool {
        self.net_profit > Decimal::ZERO
    }
}
