//! Error kinds raised by the rate core.

use std::time::Duration;
use thiserror::Error;

/// A fresh snapshot could not be obtained from a [`RateSource`](super::RateSource).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Request error: {message} for base currency: {base}")]
    Transport { base: String, message: String },

    #[error("HTTP error: {status} for base currency: {base}")]
    Status { base: String, status: u16 },

    #[error("Malformed rates response for {base}: {message}")]
    Malformed { base: String, message: String },

    #[error("Timed out after {after:?} fetching rates for {base}")]
    Timeout { base: String, after: Duration },
}

/// A conversion could not be computed from the active snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The code is neither the base currency nor present in the rates.
    #[error("Unsupported currency: {0}")]
    UnknownCurrency(String),

    #[error("No exchange rates available")]
    NoRates,
}

/// Failures of the persisted rate slot. Always recovered inside the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cached rates are corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to read cached rates: {0}")]
    ReadFailed(String),

    #[error("Failed to write cached rates: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("Invalid currency code: '{0}'")]
    InvalidCode(String),

    #[error("Invalid rate {rate} for {currency}")]
    InvalidRate { currency: String, rate: f64 },
}
