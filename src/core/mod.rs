//! Core rate logic: snapshots, conversion, caching and refresh.

pub mod cache;
pub mod config;
pub mod conversion;
pub mod coordinator;
pub mod error;
pub mod log;
pub mod snapshot;
pub mod source;

// Re-export main types for cleaner imports
pub use cache::{KeyValueCollection, RateCache, Store};
pub use conversion::{CurrencyPair, Quote};
pub use coordinator::{RefreshConfig, RefreshCoordinator, RefreshOutcome, RefreshState};
pub use error::{CacheError, ConversionError, FetchError, SnapshotError};
pub use snapshot::RateSnapshot;
pub use source::RateSource;
