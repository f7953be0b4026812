use super::error::CacheError;
use super::snapshot::RateSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A named byte-oriented key-value collection.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()>;
}

/// Hands out collections by name.
pub trait Store: Send + Sync {
    fn get_collection(&self, name: &str, persist: bool) -> Arc<dyn KeyValueCollection>;
}

pub const RATES_COLLECTION: &str = "rates";
const LATEST_KEY: &[u8] = b"latest";
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_millis(3_600_000);

/// Persisted shape of the single cached snapshot.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    rates: BTreeMap<String, f64>,
    base_currency: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    published_at: Option<DateTime<Utc>>,
}

impl From<&RateSnapshot> for CacheEntry {
    fn from(snapshot: &RateSnapshot) -> Self {
        Self {
            rates: snapshot.rates().clone(),
            base_currency: snapshot.base_currency().to_string(),
            timestamp: snapshot.timestamp(),
            published_at: snapshot.published_at(),
        }
    }
}

impl CacheEntry {
    fn into_snapshot(self) -> Result<RateSnapshot, CacheError> {
        RateSnapshot::new(&self.base_currency, self.rates, self.timestamp)
            .map(|s| s.with_published_at(self.published_at))
            .map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

/// One-slot, time-bounded cache of the most recent snapshot.
///
/// Caching is best effort: read problems surface as a miss and write
/// problems are logged, never returned.
#[derive(Clone)]
pub struct RateCache {
    collection: Arc<dyn KeyValueCollection>,
    duration: Duration,
}

impl RateCache {
    pub fn new(collection: Arc<dyn KeyValueCollection>, duration: Duration) -> Self {
        Self {
            collection,
            duration,
        }
    }

    /// Returns the cached snapshot if it is younger than the cache duration.
    pub async fn load(&self) -> Option<RateSnapshot> {
        self.load_at(Utc::now()).await
    }

    pub async fn load_at(&self, now: DateTime<Utc>) -> Option<RateSnapshot> {
        let snapshot = match self.read().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!("Cache MISS for rates");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached rates");
                return None;
            }
        };

        let age = snapshot.age_at(now);
        let max_age = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::MAX);
        if age >= max_age {
            info!(
                base = snapshot.base_currency(),
                age_minutes = age.num_minutes(),
                "Cache expired, will fetch fresh data"
            );
            return None;
        }

        debug!(
            base = snapshot.base_currency(),
            remaining_minutes = (max_age - age).num_minutes(),
            "Cache HIT for rates"
        );
        Some(snapshot)
    }

    /// Overwrites the cached slot. Failures are logged and swallowed.
    pub async fn store(&self, snapshot: &RateSnapshot) {
        match self.write(snapshot).await {
            Ok(()) => debug!(base = snapshot.base_currency(), "Cache PUT for rates"),
            Err(e) => warn!(error = %e, "Failed to cache rates"),
        }
    }

    async fn read(&self) -> Result<Option<RateSnapshot>, CacheError> {
        let bytes = self
            .collection
            .get(LATEST_KEY)
            .await
            .map_err(|e| CacheError::ReadFailed(e.to_string()))?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        entry.into_snapshot().map(Some)
    }

    async fn write(&self, snapshot: &RateSnapshot) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&CacheEntry::from(snapshot))
            .map_err(|e| CacheError::WriteFailed(e.to_string()))?;
        self.collection
            .put(LATEST_KEY, bytes)
            .await
            .map_err(|e| CacheError::WriteFailed(e.to_string()))
    }
}
