//! Cross-rate arithmetic over a single base-currency snapshot.
//!
//! Everything here is pure: results depend only on the snapshot and the
//! arguments. Rounding is left to the presentation layer.

use super::error::ConversionError;
use super::snapshot::RateSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// A converted amount together with the rate that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub rate: f64,
    pub converted: f64,
}

fn lookup(snapshot: &RateSnapshot, currency: &str) -> Result<f64, ConversionError> {
    snapshot
        .rate(currency)
        .ok_or_else(|| ConversionError::UnknownCurrency(currency.to_string()))
}

/// Units of `to` per one unit of `from`, routed through the base currency.
pub fn rate_between(
    snapshot: &RateSnapshot,
    from: &str,
    to: &str,
) -> Result<f64, ConversionError> {
    if from == to {
        return Ok(1.0);
    }

    let base = snapshot.base_currency();
    if from == base {
        return lookup(snapshot, to);
    }
    if to == base {
        return Ok(1.0 / lookup(snapshot, from)?);
    }

    let from_rate = lookup(snapshot, from)?;
    let to_rate = lookup(snapshot, to)?;
    Ok(to_rate / from_rate)
}

/// Converts `amount` of `from` into `to`. Negative amounts pass through.
pub fn convert(
    snapshot: &RateSnapshot,
    amount: f64,
    from: &str,
    to: &str,
) -> Result<f64, ConversionError> {
    Ok(amount * rate_between(snapshot, from, to)?)
}

pub fn quote(
    snapshot: &RateSnapshot,
    amount: f64,
    from: &str,
    to: &str,
) -> Result<Quote, ConversionError> {
    let rate = rate_between(snapshot, from, to)?;
    Ok(Quote {
        from: from.to_string(),
        to: to.to_string(),
        amount,
        rate,
        converted: amount * rate,
    })
}
