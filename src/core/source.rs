//! Exchange rate source abstraction

use super::error::FetchError;
use super::snapshot::RateSnapshot;
use async_trait::async_trait;

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetches a fresh snapshot of every rate relative to `base`.
    async fn fetch(&self, base: &str) -> Result<RateSnapshot, FetchError>;
}
