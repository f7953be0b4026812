pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::cache::{RATES_COLLECTION, RateCache, Store};
use crate::core::config::AppConfig;
use crate::core::{RefreshConfig, RefreshCoordinator, RefreshOutcome};
use crate::providers::ExchangeRateApiProvider;
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Convert {
        amount: f64,
        from: String,
        to: String,
        refresh: bool,
    },
    Popular,
    Rates,
    Watch,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("quickcurrency starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = KeyValueStore::open(&data_path);
    debug!(
        path = %data_path.display(),
        persistent = store.is_persistent(),
        "Opened rate store"
    );
    let cache = RateCache::new(
        store.get_collection(RATES_COLLECTION, true),
        config.cache_duration(),
    );
    let provider = ExchangeRateApiProvider::new(config.api_base_url());
    let coordinator = RefreshCoordinator::new(
        Arc::new(provider),
        cache,
        RefreshConfig::from(&config),
    );

    let pb = cli::ui::new_spinner("Loading exchange rates...");
    let startup = coordinator.start().await;
    pb.finish_and_clear();
    let startup = startup.context("Unable to fetch exchange rates. Please try again.")?;
    debug!(
        base = startup.snapshot.base_currency(),
        state = ?coordinator.state(),
        "Rates ready"
    );

    let result = match command {
        AppCommand::Convert {
            amount,
            from,
            to,
            refresh,
        } => cli::convert::run(&coordinator, amount, &from, &to, refresh).await,
        AppCommand::Popular => cli::popular::run(&coordinator, &config.popular_pairs),
        AppCommand::Rates => cli::rates::run(&coordinator, &config.currency_names),
        AppCommand::Watch => cli::watch::run(&coordinator, &config.popular_pairs).await,
    };

    // Let the startup refresh land so the cache is warm for the next run.
    if let Some(background) = startup.background {
        match background.await {
            Ok(Ok(RefreshOutcome::Updated(_))) => debug!("Background refresh stored"),
            Ok(Ok(RefreshOutcome::Fallback { error, .. })) | Ok(Err(error)) => {
                warn!(error = %error, "Background refresh failed")
            }
            Err(e) => warn!(error = %e, "Background refresh task failed"),
        }
    }

    result
}
