//! Daemon lifecycle: wire components, spawn background loops, wait
//! for shutdown.

use crate::arguments;
use crate::cache::TieredCache;
use crate::config;
use crate::logger::{self, LogTag};
use crate::monitor::Monitor;
use crate::providers::HttpProviderClient;
use crate::router::{BudgetTracker, ProviderRegistry, ProviderRouter};
use crate::service::DataService;
use crate::utils::check_shutdown_or_delay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub async fn run_daemon() -> Result<(), String> {
    config::load_config(&arguments::get_config_path())?;
    let cfg = config::get_config_clone();

    let cache = Arc::new(
        TieredCache::new(cfg.cache.clone())
            .map_err(|e| format!("Failed to open cache tiers: {}", e))?,
    );
    let registry = Arc::new(ProviderRegistry::from_configs(&cfg.providers));
    let budget = Arc::new(BudgetTracker::new(cfg.budget.clone()));
    let client = Arc::new(
        HttpProviderClient::new().map_err(|e| format!("Failed to build HTTP client: {}", e))?,
    );
    let router = Arc::new(ProviderRouter::new(registry, budget, client));
    let service = Arc::new(DataService::new(Arc::clone(&cache), router));
    let monitor = Arc::new(Monitor::new(Arc::clone(&service), cfg.monitor.clone()));

    logger::info(
        LogTag::System,
        &format!(
            "feedcache ready: {} provider(s), L1 capacity {}, hourly budget ${:.2}",
            service.router().registry().len(),
            cfg.cache.l1_capacity,
            cfg.budget.hourly_limit
        ),
    );

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.notify_waiters();
        })
        .map_err(|e| format!("Failed to install signal handler: {}", e))?;
    }

    let monitor_handle = tokio::spawn(Arc::clone(&monitor).run(Arc::clone(&shutdown)));
    let maintenance_handle = tokio::spawn(maintenance_loop(
        Arc::clone(&cache),
        cfg.cache.cleanup_interval_secs,
        Arc::clone(&shutdown),
    ));

    shutdown.notified().await;
    logger::info(LogTag::System, "Shutdown requested, stopping background tasks");

    for handle in [monitor_handle, maintenance_handle] {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    logger::flush();
    Ok(())
}

/// Expired-entry sweep for both cache tiers. A backstop: reads check
/// expiry themselves, this just reclaims space.
async fn maintenance_loop(cache: Arc<TieredCache>, interval_secs: u64, shutdown: Arc<Notify>) {
    let interval = Duration::from_secs(interval_secs.max(1));

    loop {
        if check_shutdown_or_delay(&shutdown, interval).await {
            logger::info(LogTag::Cache, "Maintenance loop shutting down");
            break;
        }

        let purged = cache.purge_expired();
        if purged > 0 {
            logger::debug(
                LogTag::Cache,
                &format!("Expiry sweep removed {} entries", purged),
            );
        }
    }
}
