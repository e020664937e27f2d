// In crates/risk/src/fees.rs

use crate::types::FeeSettings;
use crate::{Error, Result};
use core_types::{ClosedTrade, ExitReason, Position};
use chrono::{DateTime, Utc};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Commission, tax and slippage rates for one market, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub commission_pct: Decimal,
    pub tax_pct: Decimal,
    pub slippage_pct: Decimal,
}

/// Gross and net result of a round trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBreakdown {
    pub entry_value: Decimal,
    pub exit_value: Decimal,
    pub gross_profit: Decimal,
    pub buy_fee: Decimal,
    pub sell_fee: Decimal,
    pub net_profit: Decimal,
    /// `net_profit / entry_value * 100`, rounded to 2 decimals.
    pub net_profit_rate: Decimal,
}

fn pct(name: &str, value: f64) -> Result<Decimal> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidParameters(format!("{name} must be a non-negative rate, got {value}")));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| Error::InvalidParameters(format!("{name} is not representable: {value}")))
}

impl FeeSchedule {
    pub fn new(commission_pct: f64, tax_pct: f64, slippage_pct: f64) -> Result<Self> {
        Ok(Self {
            commission_pct: pct("commission_pct", commission_pct)?,
            tax_pct: pct("tax_pct", tax_pct)?,
            slippage_pct: pct("slippage_pct", slippage_pct)?,
        })
    }

    pub fn buy_fee(&self, value: Decimal) -> Decimal {
        value * self.commission_pct / Decimal::ONE_HUNDRED
    }

    pub fn sell_fee(&self, value: Decimal) -> Decimal {
        value * (self.commission_pct + self.tax_pct) / Decimal::ONE_HUNDRED
    }

    /// Minimum gross move, in percent, for a round trip to not lose money:
    /// buy (commission + slippage) plus sell (commission + tax + slippage).
    pub fn break_even_pct(&self) -> Decimal {
        let buy = self.commission_pct + self.slippage_pct;
        let sell = self.commission_pct + self.tax_pct + self.slippage_pct;
        buy + sell
    }

    pub fn profit(&self, entry_price: Decimal, exit_price: Decimal, quantity: u64) -> ProfitBreakdown {
        let qty = Decimal::from(quantity);
        let entry_value = entry_price * qty;
        let exit_value = exit_price * qty;
        let gross_profit = exit_value - entry_value;
        let buy_fee = self.buy_fee(entry_value);
        let sell_fee = self.sell_fee(exit_value);
        let net_profit = gross_profit - buy_fee - sell_fee;
        let net_profit_rate = if entry_value.is_zero() {
            Decimal::ZERO
        } else {
            (net_profit / entry_value * Decimal::ONE_HUNDRED).round_dp(2)
        };

        ProfitBreakdown {
            entry_value,
            exit_value,
            gross_profit,
            buy_fee,
            sell_fee,
            net_profit,
            net_profit_rate,
        }
    }

    /// Realizes `quantity` shares of `position` at `exit_price`.
    pub fn close(
        &self,
        position: &Position,
        exit_price: Decimal,
        quantity: u64,
        reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> ClosedTrade {
        let p = self.profit(position.entry_price, exit_price, quantity);
        ClosedTrade {
            instrument: position.instrument.clone(),
            reason,
            quantity,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_time,
            exit_time,
            gross_profit: p.gross_profit,
            buy_fee: p.buy_fee,
            sell_fee: p.sell_fee,
            net_profit: p.net_profit,
            net_profit_rate: p.net_profit_rate,
        }
    }
}

/// Fee schedules per listing market, falling back to the default rates. Market names
/// match case-insensitively.
#[derive(Debug, Clone)]
pub struct FeeBook {
    default: FeeSchedule,
    markets: HashMap<String, FeeSchedule>,
}

impl FeeBook {
    pub fn from_settings(settings: &FeeSettings) -> Result<Self> {
        let default = FeeSchedule::new(settings.commission_pct, settings.tax_pct, settings.slippage_pct)?;
        let markets = settings
            .market_tax_pct
            .iter()
            .map(|(market, tax)| {
                FeeSchedule::new(settings.commission_pct, *tax, settings.slippage_pct)
                    .map(|schedule| (market.to_ascii_uppercase(), schedule))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { default, markets })
    }

    pub fn for_market(&self, market: Option<&str>) -> &FeeSchedule {
        market
            .and_then(|m| self.markets.get(&m.to_ascii_uppercase()))
            .unwrap_or(&self.default)
    }
}
