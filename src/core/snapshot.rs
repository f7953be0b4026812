//! Immutable exchange rate tables

use super::error::SnapshotError;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::collections::BTreeMap;

/// One timestamped set of rates relative to a base currency.
///
/// A rate is the number of units of that currency per one unit of the base.
/// The base itself is never stored; its rate is always 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    base_currency: String,
    rates: BTreeMap<String, f64>,
    timestamp: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl RateSnapshot {
    /// Builds a snapshot, dropping any self-entry for the base currency.
    ///
    /// Fails when the base code is empty or a rate is not a positive finite
    /// number. The timestamp is kept at millisecond precision.
    pub fn new<I>(
        base_currency: &str,
        rates: I,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, SnapshotError>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let base_currency = base_currency.trim();
        if base_currency.is_empty() {
            return Err(SnapshotError::InvalidCode(base_currency.to_string()));
        }

        let mut table = BTreeMap::new();
        for (currency, rate) in rates {
            if currency.is_empty() {
                return Err(SnapshotError::InvalidCode(currency));
            }
            if currency == base_currency {
                continue;
            }
            if !rate.is_finite() || rate <= 0.0 {
                return Err(SnapshotError::InvalidRate { currency, rate });
            }
            table.insert(currency, rate);
        }

        Ok(Self {
            base_currency: base_currency.to_string(),
            rates: table,
            timestamp: timestamp.trunc_subsecs(3),
            published_at: None,
        })
    }

    /// Attaches the provider's own "last updated" time.
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at.map(|t| t.trunc_subsecs(3));
        self
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn rates(&self) -> &BTreeMap<String, f64> {
        &self.rates
    }

    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.timestamp)
    }
}
