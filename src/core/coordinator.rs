//! Keeps the active rate snapshot current.
//!
//! The coordinator serves a cached snapshot immediately when one is valid,
//! refreshes from the [`RateSource`] in the background or on demand, and
//! falls back to the last known good snapshot when a fetch fails. At most
//! one fetch is in flight: callers asking for the same base currency share
//! its result. Each fetch runs as its own task, so it completes and clears
//! the in-flight slot even when every caller stops waiting.

use super::cache::RateCache;
use super::config::AppConfig;
use super::conversion::{self, Quote};
use super::error::{ConversionError, FetchError};
use super::snapshot::RateSnapshot;
use super::source::RateSource;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No usable snapshot.
    Empty,
    /// Serving a snapshot read from the cache.
    Cached,
    /// Serving a snapshot fetched by this process.
    Fresh,
    /// Blocking startup fetch in progress.
    Refreshing,
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub base_currency: String,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            base_currency: super::config::DEFAULT_BASE_CURRENCY.to_string(),
            refresh_interval: Duration::from_millis(3_600_000),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&AppConfig> for RefreshConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_currency: config.base_currency.trim().to_uppercase(),
            refresh_interval: config.refresh_interval(),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Result of a refresh that still left usable rates in place.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated(Arc<RateSnapshot>),
    /// The fetch failed; `snapshot` is the last known good one.
    Fallback {
        snapshot: Arc<RateSnapshot>,
        error: FetchError,
    },
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> &Arc<RateSnapshot> {
        match self {
            RefreshOutcome::Updated(snapshot) => snapshot,
            RefreshOutcome::Fallback { snapshot, .. } => snapshot,
        }
    }
}

pub struct Startup {
    pub snapshot: Arc<RateSnapshot>,
    /// Background refresh spawned when startup was served from the cache.
    pub background: Option<JoinHandle<Result<RefreshOutcome, FetchError>>>,
}

type FetchResult = Result<Arc<RateSnapshot>, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct InFlight {
    id: u64,
    base: String,
    fetch: SharedFetch,
}

struct Inner {
    source: Arc<dyn RateSource>,
    cache: RateCache,
    config: RefreshConfig,
    current: watch::Sender<Option<Arc<RateSnapshot>>>,
    state: watch::Sender<RefreshState>,
    in_flight: Mutex<Option<InFlight>>,
    loading: AtomicBool,
    next_fetch_id: AtomicU64,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn RateSource>, cache: RateCache, config: RefreshConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cache,
                config,
                current: watch::Sender::new(None),
                state: watch::Sender::new(RefreshState::Empty),
                in_flight: Mutex::new(None),
                loading: AtomicBool::new(false),
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn current(&self) -> Option<Arc<RateSnapshot>> {
        self.inner.current.borrow().clone()
    }

    pub fn state(&self) -> RefreshState {
        *self.inner.state.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst)
    }

    /// Receives every replacement of the active snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RateSnapshot>>> {
        self.inner.current.subscribe()
    }

    /// Base of the active snapshot, or the configured default before one exists.
    pub fn base_currency(&self) -> String {
        self.current().map_or_else(
            || self.inner.config.base_currency.clone(),
            |s| s.base_currency().to_string(),
        )
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Result<Quote, ConversionError> {
        let snapshot = self.current().ok_or(ConversionError::NoRates)?;
        conversion::quote(&snapshot, amount, from, to)
    }

    /// Brings up the first snapshot.
    ///
    /// A valid cached snapshot is served at once and refreshed in the
    /// background. Otherwise the source is fetched before returning; if
    /// that fails and the cache is still empty, no rates are available.
    #[instrument(name = "RatesStartup", skip(self))]
    pub async fn start(&self) -> Result<Startup, FetchError> {
        if let Some(snapshot) = self.inner.cache.load().await {
            let snapshot = Arc::new(snapshot);
            info!(base = snapshot.base_currency(), "Serving cached rates");
            self.publish(Arc::clone(&snapshot), RefreshState::Cached);

            let this = self.clone();
            let base = self.inner.config.base_currency.clone();
            let background = tokio::spawn(async move {
                let outcome = this.refresh_base(&base).await;
                if let Ok(RefreshOutcome::Updated(_)) = &outcome {
                    info!("Fresh rates loaded in background");
                }
                outcome
            });

            return Ok(Startup {
                snapshot,
                background: Some(background),
            });
        }

        info!("No cached rates, fetching");
        self.inner.state.send_replace(RefreshState::Refreshing);
        let base = self.inner.config.base_currency.clone();
        match self.fetch(&base).await {
            Ok(snapshot) => Ok(Startup {
                snapshot,
                background: None,
            }),
            Err(e) => match self.inner.cache.load().await {
                Some(snapshot) => {
                    warn!(error = %e, "Fetch failed, using cached rates");
                    let snapshot = Arc::new(snapshot);
                    self.publish(Arc::clone(&snapshot), RefreshState::Cached);
                    Ok(Startup {
                        snapshot,
                        background: None,
                    })
                }
                None => {
                    error!(error = %e, "No exchange rates available");
                    self.inner.state.send_replace(RefreshState::Empty);
                    Err(e)
                }
            },
        }
    }

    /// Refreshes the active base currency.
    pub async fn refresh(&self) -> Result<RefreshOutcome, FetchError> {
        let base = self.base_currency();
        self.refresh_base(&base).await
    }

    /// Fetches `base`, keeping the last known good snapshot on failure.
    ///
    /// Errors only when the fetch fails and there are no rates at all.
    pub async fn refresh_base(&self, base: &str) -> Result<RefreshOutcome, FetchError> {
        let error = match self.fetch(base).await {
            Ok(snapshot) => return Ok(RefreshOutcome::Updated(snapshot)),
            Err(e) => e,
        };

        if let Some(snapshot) = self.current() {
            warn!(error = %error, "Refresh failed, keeping last known rates");
            return Ok(RefreshOutcome::Fallback { snapshot, error });
        }

        if let Some(snapshot) = self.inner.cache.load().await {
            warn!(error = %error, "Refresh failed, using cached rates");
            let snapshot = Arc::new(snapshot);
            self.publish(Arc::clone(&snapshot), RefreshState::Cached);
            return Ok(RefreshOutcome::Fallback { snapshot, error });
        }

        Err(error)
    }

    /// Refreshes on a fixed interval until the returned task is aborted.
    ///
    /// Ticks that land while a fetch is still in flight are skipped.
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.inner.config.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if this.is_loading() {
                    debug!("Fetch already in flight, skipping auto-refresh");
                    continue;
                }

                debug!("Auto-refreshing rates");
                match this.refresh().await {
                    Ok(RefreshOutcome::Updated(s)) => {
                        info!(base = s.base_currency(), "Auto-refresh complete")
                    }
                    Ok(RefreshOutcome::Fallback { error, .. }) => {
                        warn!(error = %error, "Auto-refresh failed")
                    }
                    Err(e) => warn!(error = %e, "Auto-refresh failed, no rates available"),
                }
            }
        })
    }

    fn publish(&self, snapshot: Arc<RateSnapshot>, state: RefreshState) {
        self.inner.current.send_replace(Some(snapshot));
        self.inner.state.send_replace(state);
    }

    /// Joins the in-flight fetch for `base`, or starts one.
    async fn fetch(&self, base: &str) -> FetchResult {
        let fetch = loop {
            let mut in_flight = self.inner.in_flight.lock().await;
            let pending = in_flight
                .as_ref()
                .map(|p| (p.base == base, p.fetch.clone()));

            match pending {
                Some((true, fetch)) => {
                    debug!(base, "Joining in-flight fetch");
                    break fetch;
                }
                Some((false, other)) => {
                    drop(in_flight);
                    debug!(base, "Waiting for in-flight fetch of another base");
                    let _ = other.await;
                }
                None => {
                    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::SeqCst);
                    let task =
                        tokio::spawn(run_fetch(Arc::clone(&self.inner), base.to_string(), id));
                    let task_base = base.to_string();
                    let fetch = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(FetchError::Transport {
                                base: task_base,
                                message: format!("fetch task failed: {e}"),
                            })
                        })
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(InFlight {
                        id,
                        base: base.to_string(),
                        fetch: fetch.clone(),
                    });
                    self.inner.loading.store(true, Ordering::SeqCst);
                    break fetch;
                }
            }
        };

        fetch.await
    }
}

#[instrument(name = "RatesFetch", skip(inner, id))]
async fn run_fetch(inner: Arc<Inner>, base: String, id: u64) -> FetchResult {
    let timeout = inner.config.fetch_timeout;
    let result = match tokio::time::timeout(timeout, inner.source.fetch(&base)).await {
        Ok(Ok(snapshot)) => Ok(Arc::new(snapshot)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(FetchError::Timeout {
            base: base.clone(),
            after: timeout,
        }),
    };

    match &result {
        Ok(snapshot) => {
            debug!(currencies = snapshot.rates().len(), "Fetched rates");
            inner.cache.store(snapshot).await;
            inner.current.send_replace(Some(Arc::clone(snapshot)));
            inner.state.send_replace(RefreshState::Fresh);
        }
        Err(e) => debug!(error = %e, "Fetch failed"),
    }

    let mut in_flight = inner.in_flight.lock().await;
    if in_flight.as_ref().is_some_and(|p| p.id == id) {
        *in_flight = None;
        inner.loading.store(false, Ordering::SeqCst);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::DEFAULT_CACHE_DURATION;
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Replays scripted responses, then repeats the last one.
    struct ScriptedSource {
        responses: std::sync::Mutex<VecDeque<Result<RateSnapshot, FetchError>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<RateSnapshot, FetchError>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn fetch(&self, base: &str) -> Result<RateSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            };
            response.map(|s| rebased(&s, base))
        }
    }

    fn rebased(snapshot: &RateSnapshot, base: &str) -> RateSnapshot {
        if snapshot.base_currency() == base {
            return snapshot.clone();
        }
        RateSnapshot::new(base, snapshot.rates().clone(), snapshot.timestamp()).unwrap()
    }

    fn snapshot(eur: f64) -> RateSnapshot {
        RateSnapshot::new(
            "USD",
            vec![("EUR".to_string(), eur), ("JPY".to_string(), 149.5)],
            Utc::now(),
        )
        .unwrap()
    }

    fn outage() -> FetchError {
        FetchError::Status {
            base: "USD".to_string(),
            status: 503,
        }
    }

    #[test]
    fn test_refresh_config_normalizes_base_currency() {
        let config = AppConfig {
            base_currency: " usd ".to_string(),
            ..AppConfig::default()
        };

        assert_eq!(RefreshConfig::from(&config).base_currency, "USD");
    }

    fn coordinator(source: Arc<ScriptedSource>) -> (RefreshCoordinator, RateCache) {
        let cache = RateCache::new(Arc::new(MemoryCollection::new()), DEFAULT_CACHE_DURATION);
        let coordinator = RefreshCoordinator::new(source, cache.clone(), RefreshConfig::default());
        (coordinator, cache)
    }

    #[tokio::test]
    async fn test_startup_without_cache_fetches_and_persists() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(snapshot(0.92))]));
        let (coordinator, cache) = coordinator(source.clone());

        let startup = coordinator.start().await.unwrap();

        assert!(startup.background.is_none());
        assert_eq!(startup.snapshot.rate("EUR"), Some(0.92));
        assert_eq!(coordinator.state(), RefreshState::Fresh);
        assert!(!coordinator.is_loading());
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.load().await.as_ref(), Some(startup.snapshot.as_ref()));
    }

    #[tokio::test]
    async fn test_startup_with_cache_serves_instantly_then_refreshes() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(snapshot(0.95))]));
        let (coordinator, cache) = coordinator(source.clone());
        cache.store(&snapshot(0.92)).await;

        let startup = coordinator.start().await.unwrap();
        assert_eq!(startup.snapshot.rate("EUR"), Some(0.92));

        let outcome = startup.background.unwrap().await.unwrap().unwrap();
        assert!(matches!(outcome, RefreshOutcome::Updated(_)));
        assert_eq!(coordinator.state(), RefreshState::Fresh);
        assert_eq!(coordinator.current().unwrap().rate("EUR"), Some(0.95));
        assert_eq!(cache.load().await.unwrap().rate("EUR"), Some(0.95));
    }

    #[tokio::test]
    async fn test_background_failure_keeps_cached_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![Err(outage())]));
        let (coordinator, cache) = coordinator(source);
        let cached = snapshot(0.92);
        cache.store(&cached).await;

        let startup = coordinator.start().await.unwrap();
        let outcome = startup.background.unwrap().await.unwrap().unwrap();

        assert!(matches!(outcome, RefreshOutcome::Fallback { .. }));
        assert_eq!(coordinator.state(), RefreshState::Cached);
        assert_eq!(coordinator.current().unwrap().as_ref(), &cached);
    }

    #[tokio::test]
    async fn test_startup_failure_without_cache_is_fatal() {
        let source = Arc::new(ScriptedSource::new(vec![Err(outage())]));
        let (coordinator, _) = coordinator(source);

        let result = coordinator.start().await;

        assert_eq!(result.err(), Some(outage()));
        assert_eq!(coordinator.state(), RefreshState::Empty);
        assert!(coordinator.current().is_none());
        assert_eq!(
            coordinator.convert(1.0, "USD", "EUR"),
            Err(ConversionError::NoRates)
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_back_to_valid_cache() {
        let source = Arc::new(ScriptedSource::new(vec![Err(outage())]));
        let (coordinator, cache) = coordinator(source);
        let cached = snapshot(0.92);
        cache.store(&cached).await;

        let outcome = coordinator.refresh().await.unwrap();

        match outcome {
            RefreshOutcome::Fallback { snapshot, error } => {
                assert_eq!(snapshot.as_ref(), &cached);
                assert_eq!(error, outage());
            }
            other => panic!("Expected fallback, got {other:?}"),
        }
        assert_eq!(coordinator.current().unwrap().as_ref(), &cached);
        assert_eq!(coordinator.state(), RefreshState::Cached);
    }

    #[tokio::test]
    async fn test_manual_refresh_failure_keeps_last_good_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(snapshot(0.92)),
            Err(outage()),
        ]));
        let (coordinator, _) = coordinator(source);
        coordinator.start().await.unwrap();

        let outcome = coordinator.refresh().await.unwrap();

        assert!(matches!(outcome, RefreshOutcome::Fallback { .. }));
        assert_eq!(outcome.snapshot().rate("EUR"), Some(0.92));
        assert_eq!(coordinator.state(), RefreshState::Fresh);
        let quote = coordinator.convert(100.0, "USD", "EUR").unwrap();
        assert_eq!(quote.converted, 92.0);
    }

    #[tokio::test]
    async fn test_manual_refresh_replaces_snapshot() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(snapshot(0.92)),
            Ok(snapshot(0.90)),
        ]));
        let (coordinator, cache) = coordinator(source);
        coordinator.start().await.unwrap();
        let mut updates = coordinator.subscribe();

        let outcome = coordinator.refresh().await.unwrap();

        assert!(matches!(outcome, RefreshOutcome::Updated(_)));
        assert!(updates.has_changed().unwrap());
        assert_eq!(
            updates.borrow_and_update().as_ref().unwrap().rate("EUR"),
            Some(0.90)
        );
        assert_eq!(cache.load().await.unwrap().rate("EUR"), Some(0.90));
    }

    #[tokio::test]
    async fn test_refresh_without_any_rates_errors() {
        let source = Arc::new(ScriptedSource::new(vec![Err(outage())]));
        let (coordinator, _) = coordinator(source);

        assert_eq!(coordinator.refresh().await.err(), Some(outage()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(snapshot(0.92))]).with_delay(Duration::from_secs(1)),
        );
        let (coordinator, _) = coordinator(source.clone());

        let (first, second) = tokio::join!(coordinator.refresh(), coordinator.refresh());

        assert_eq!(source.calls(), 1);
        assert!(Arc::ptr_eq(
            first.unwrap().snapshot(),
            second.unwrap().snapshot()
        ));
        assert!(!coordinator.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_for_other_base_waits_for_in_flight() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(snapshot(0.92))]).with_delay(Duration::from_secs(1)),
        );
        let (coordinator, _) = coordinator(source.clone());

        let (usd, eur) = tokio::join!(
            coordinator.refresh_base("USD"),
            coordinator.refresh_base("EUR")
        );

        assert_eq!(source.calls(), 2);
        assert_eq!(usd.unwrap().snapshot().base_currency(), "USD");
        assert_eq!(eur.unwrap().snapshot().base_currency(), "EUR");
        assert_eq!(coordinator.base_currency(), "EUR");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out_and_falls_back() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(snapshot(0.95))]).with_delay(Duration::from_secs(3600)),
        );
        let (coordinator, cache) = coordinator(source);
        let cached = snapshot(0.92);
        cache.store(&cached).await;

        let outcome = coordinator.refresh().await.unwrap();

        match outcome {
            RefreshOutcome::Fallback { snapshot, error } => {
                assert_eq!(snapshot.as_ref(), &cached);
                assert!(matches!(error, FetchError::Timeout { .. }));
            }
            other => panic!("Expected fallback, got {other:?}"),
        }
        assert!(!coordinator.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_replaces_snapshot_each_interval() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(snapshot(0.92)),
            Ok(snapshot(0.93)),
            Ok(snapshot(0.94)),
        ]));
        let (coordinator, _) = coordinator(source.clone());
        coordinator.start().await.unwrap();
        let mut updates = coordinator.subscribe();

        let task = coordinator.spawn_auto_refresh();

        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow_and_update().as_ref().unwrap().rate("EUR"),
            Some(0.93)
        );
        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow_and_update().as_ref().unwrap().rate("EUR"),
            Some(0.94)
        );
        assert_eq!(source.calls(), 3);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_refresh_still_completes() {
        let source = Arc::new(
            ScriptedSource::new(vec![Ok(snapshot(0.92)), Ok(snapshot(0.93))])
                .with_delay(Duration::from_secs(5)),
        );
        let (coordinator, cache) = coordinator(source.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), coordinator.refresh()).await;
        assert!(abandoned.is_err());
        assert!(coordinator.is_loading());

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.current().unwrap().rate("EUR"), Some(0.92));
        assert_eq!(coordinator.state(), RefreshState::Fresh);
        assert!(cache.load().await.is_some());
        assert_eq!(source.calls(), 1);

        let mut updates = coordinator.subscribe();
        let task = coordinator.spawn_auto_refresh();

        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow_and_update().as_ref().unwrap().rate("EUR"),
            Some(0.93)
        );
        assert_eq!(source.calls(), 2);

        task.abort();
    }
}
