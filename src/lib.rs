pub mod cli;
pub mod core;
pub mod pricing;
pub mod providers;
pub mod store;

use crate::cli::prices::FetchOptions;
use crate::core::config::AppConfig;
use crate::pricing::PriceService;
use crate::providers::CoinGeckoProvider;
use crate::store::KeyValueStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Fetch(FetchOptions),
    Sweep,
    Usage,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Argos starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!(pricing = ?config.pricing, "Loaded config");

    let store = KeyValueStore::open(&config.default_data_path()?)?;

    let coingecko = config.providers.coingecko.clone().unwrap_or_default();
    let provider = CoinGeckoProvider::new(&coingecko.base_url, coingecko.api_key)?;
    let service = PriceService::new(Arc::new(provider), &store, &config)?;
    let sweeper = service.sweeper(config.pricing.max_cache_age());

    let result = match command {
        AppCommand::Fetch(options) => {
            let period = Duration::from_secs(config.pricing.sweep_interval_secs.max(1));
            let handle = sweeper.spawn(period);
            let service = service.with_sweep_trigger(handle.trigger());
            let result = cli::prices::run(&service, &options).await;
            handle.shutdown().await;
            result
        }
        AppCommand::Sweep => cli::maintenance::sweep(&sweeper).await,
        AppCommand::Usage => cli::maintenance::usage(&service).await,
    };

    store.flush()?;
    result
}
