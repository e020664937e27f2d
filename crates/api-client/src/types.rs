// In crates/api-client/src/types.rs

use crate::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use core_types::{Candle, InstrumentCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Exchange-local offset used by the brokerage's timestamps (KST).
pub const EXCHANGE_UTC_OFFSET_SECS: i32 = 9 * 3600;

/// Current quote for an instrument, decoded from the brokerage response.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub prev_close: Decimal,
    pub volume: Decimal,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub open: Option<Decimal>,
}

/// Bar size for candle requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlePeriod {
    Minutes(u32),
    Day,
}

impl CandlePeriod {
    pub fn duration(&self) -> Duration {
        match self {
            CandlePeriod::Minutes(m) => Duration::minutes(i64::from(*m)),
            CandlePeriod::Day => Duration::days(1),
        }
    }
}

impl fmt::Display for CandlePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandlePeriod::Minutes(m) => write!(f, "{m}m"),
            CandlePeriod::Day => f.write_str("1d"),
        }
    }
}

/// A pushed trade print for a subscribed instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTick {
    pub instrument: InstrumentCode,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Callback invoked by the gateway's delivery loop for every pushed tick.
pub type PriceCallback = Arc<dyn Fn(LiveTick) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: u64,
    pub instrument: InstrumentCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderHandle {
    pub order_id: String,
    /// Average fill price, when the broker reports it synchronously.
    pub filled_price: Option<Decimal>,
    pub filled_quantity: u64,
}

// --- Wire schema ---
//
// The brokerage returns every number as a string and omits fields freely. Responses are
// decoded once here; everything past this module works with `Quote` and `Candle`.

/// Envelope shared by all REST responses. `rt_cd == "0"` means success.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub rt_cd: String,
    #[serde(default)]
    pub msg1: String,
    pub output: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_output(self) -> Result<T> {
        if self.rt_cd != "0" {
            return Err(Error::ApiError { code: self.rt_cd, msg: self.msg1 });
        }
        self.output.ok_or(Error::MissingField("output"))
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "stck_prpr")]
    pub price: Option<String>,
    #[serde(rename = "stck_sdpr")]
    pub prev_close: Option<String>,
    #[serde(rename = "acml_vol")]
    pub volume: Option<String>,
    #[serde(rename = "stck_hgpr")]
    pub high: Option<String>,
    #[serde(rename = "stck_lwpr")]
    pub low: Option<String>,
    #[serde(rename = "stck_oprc")]
    pub open: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandleRow {
    #[serde(rename = "stck_bsop_date")]
    pub date: Option<String>,
    /// HHMMSS; absent for daily bars.
    #[serde(rename = "stck_cntg_hour")]
    pub time: Option<String>,
    #[serde(rename = "stck_oprc")]
    pub open: Option<String>,
    #[serde(rename = "stck_hgpr")]
    pub high: Option<String>,
    #[serde(rename = "stck_lwpr")]
    pub low: Option<String>,
    #[serde(rename = "stck_prpr", alias = "stck_clpr")]
    pub close: Option<String>,
    #[serde(rename = "cntg_vol", alias = "acml_vol")]
    pub volume: Option<String>,
}

fn required(field: &'static str, raw: Option<String>) -> Result<Decimal> {
    let raw = raw.ok_or(Error::MissingField(field))?;
    parse_decimal(field, &raw)
}

fn optional(field: &'static str, raw: Option<String>) -> Result<Option<Decimal>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_decimal(field, value).map(Some),
    }
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|_| Error::MalformedField {
        field,
        value: raw.to_string(),
    })
}

impl TryFrom<QuoteResponse> for Quote {
    type Error = Error;

    fn try_from(raw: QuoteResponse) -> Result<Self> {
        Ok(Quote {
            price: required("stck_prpr", raw.price)?,
            prev_close: required("stck_sdpr", raw.prev_close)?,
            volume: optional("acml_vol", raw.volume)?.unwrap_or(Decimal::ZERO),
            high: optional("stck_hgpr", raw.high)?,
            low: optional("stck_lwpr", raw.low)?,
            open: optional("stck_oprc", raw.open)?,
        })
    }
}

impl TryFrom<CandleRow> for Candle {
    type Error = Error;

    fn try_from(raw: CandleRow) -> Result<Self> {
        let close = required("stck_prpr", raw.close)?;
        let date_raw = raw.date.ok_or(Error::MissingField("stck_bsop_date"))?;
        let date = NaiveDate::parse_from_str(date_raw.trim(), "%Y%m%d").map_err(|_| {
            Error::MalformedField { field: "stck_bsop_date", value: date_raw.clone() }
        })?;
        let time = match raw.time.as_deref().map(str::trim) {
            None | Some("") => NaiveTime::from_hms_opt(0, 0, 0)
                .ok_or(Error::MalformedField { field: "stck_cntg_hour", value: String::new() })?,
            Some(hms) => NaiveTime::parse_from_str(hms, "%H%M%S").map_err(|_| {
                Error::MalformedField { field: "stck_cntg_hour", value: hms.to_string() }
            })?,
        };
        let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)
            .ok_or(Error::MalformedField { field: "offset", value: EXCHANGE_UTC_OFFSET_SECS.to_string() })?;
        let local = offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or(Error::MalformedField { field: "stck_cntg_hour", value: time.to_string() })?;

        Ok(Candle {
            time: local.with_timezone(&Utc),
            open: optional("stck_oprc", raw.open)?.unwrap_or(close),
            high: optional("stck_hgpr", raw.high)?.unwrap_or(close),
            low: optional("stck_lwpr", raw.low)?.unwrap_or(close),
            close,
            volume: optional("cntg_vol", raw.volume)?.unwrap_or(Decimal::ZERO),
        })
    }
}

/// Decodes a quote response body.
pub fn decode_quote(body: &str) -> Result<Quote> {
    let envelope: Envelope<QuoteResponse> = serde_json::from_str(body)?;
    envelope.into_output()?.try_into()
}

/// Decodes a candle response body. The brokerage lists newest first; the result is
/// ordered by ascending time.
pub fn decode_candles(body: &str) -> Result<Vec<Candle>> {
    let envelope: Envelope<Vec<CandleRow>> = serde_json::from_str(body)?;
    let mut candles = envelope
        .into_output()?
        .into_iter()
        .map(Candle::try_from)
        .collect::<Result<Vec<_>>>()?;
    candles.sort_by_key(|c| c.time);
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_quote_with_optional_fields_missing() {
        let body = r#"{"rt_cd":"0","msg1":"OK","output":{"stck_prpr":"71500","stck_sdpr":"70900","acml_vol":"1234567"}}"#;
        let quote = decode_quote(body).unwrap();
        assert_eq!(quote.price, dec!(71500));
        assert_eq!(quote.prev_close, dec!(70900));
        assert_eq!(quote.volume, dec!(1234567));
        assert_eq!(quote.high, None);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let body = r#"{"rt_cd":"0","output":{"stck_sdpr":"70900"}}"#;
        assert!(matches!(decode_quote(body), Err(Error::MissingField("stck_prpr"))));
    }

    #[test]
    fn api_error_code_is_surfaced() {
        let body = r#"{"rt_cd":"1","msg1":"rate limit exceeded"}"#;
        assert!(matches!(decode_quote(body), Err(Error::ApiError { .. })));
    }

    #[test]
    fn candles_are_sorted_ascending_and_converted_to_utc() {
        let body = r#"{"rt_cd":"0","output":[
            {"stck_bsop_date":"20250102","stck_cntg_hour":"091000","stck_prpr":"101","cntg_vol":"10"},
            {"stck_bsop_date":"20250102","stck_cntg_hour":"090000","stck_prpr":"100","stck_oprc":"99","cntg_vol":"5"}
        ]}"#;
        let candles = decode_candles(body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(100));
        assert_eq!(candles[0].open, dec!(99));
        assert_eq!(candles[1].open, dec!(101));
        assert_eq!(candles[0].time, Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
    }
}
