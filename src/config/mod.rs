/// Configuration loading, hot-reloading, and thread-safe access
///
/// The global CONFIG is the single source of truth. Load it once at
/// startup; reload_config() re-reads the file at runtime (provider
/// records are also hot-swappable individually through the router's
/// registry).
mod schemas;

pub use schemas::{BudgetSettings, CacheSettings, Config, MonitorSettings, ProviderConfig};

use crate::logger::{self, LogTag};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::RwLock;

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from disk and initialize the global CONFIG.
///
/// Missing file is not an error: defaults apply and a template is not
/// written (the daemon can run cache-only with zero providers).
pub fn load_config(path: &str) -> Result<(), String> {
    let config = read_config_file(path)?;

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| "Configuration already loaded".to_string())?;

    logger::info(LogTag::Config, &format!("Configuration loaded from {}", path));
    Ok(())
}

/// Re-read the config file and swap the global instance in place
pub fn reload_config(path: &str) -> Result<(), String> {
    let fresh = read_config_file(path)?;

    let lock = CONFIG
        .get()
        .ok_or_else(|| "Configuration not loaded yet".to_string())?;

    let mut guard = lock
        .write()
        .map_err(|_| "Configuration lock poisoned".to_string())?;
    *guard = fresh;

    logger::info(LogTag::Config, "Configuration reloaded");
    Ok(())
}

fn read_config_file(path: &str) -> Result<Config, String> {
    if !Path::new(path).exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file {} not found, using defaults", path),
        );
        return Ok(Config::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path, e))?;

    let config: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse {}: {}", path, e))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), String> {
    if config.budget.hourly_limit < 0.0
        || config.budget.daily_limit < 0.0
        || config.budget.monthly_limit < 0.0
    {
        return Err("Budget limits must be non-negative".to_string());
    }
    if config.cache.l1_capacity == 0 {
        return Err("cache.l1_capacity must be at least 1".to_string());
    }
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            return Err("Provider name must not be empty".to_string());
        }
        if provider.cost_per_request < 0.0 {
            return Err(format!(
                "Provider {} has negative cost_per_request",
                provider.name
            ));
        }
        if !(0.0..=1.0).contains(&provider.reliability)
            || !(0.0..=1.0).contains(&provider.data_quality)
        {
            return Err(format!(
                "Provider {} scores must be within 0..=1",
                provider.name
            ));
        }
    }
    Ok(())
}

/// Get a clone of the current configuration
pub fn get_config_clone() -> Config {
    CONFIG
        .get()
        .and_then(|lock| lock.read().ok().map(|guard| guard.clone()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert!(config.budget.block_hourly);
        assert!(!config.budget.block_daily);
    }

    #[test]
    fn test_parse_partial_toml() {
        let raw = r#"
            [budget]
            hourly_limit = 2.5

            [[providers]]
            name = "sportsfeed"
            base_url = "https://api.sportsfeed.example"
            cost_per_request = 0.01
            requests_per_minute = 60
            specialties = ["odds", "live"]
        "#;

        let config: Config = toml::from_str(raw).expect("partial toml parses");
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.budget.hourly_limit, 2.5);
        // untouched sections keep defaults
        assert_eq!(config.budget.daily_limit, 50.0);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "sportsfeed");
        assert!(config.providers[0].enabled);
    }

    #[test]
    fn test_invalid_provider_scores_rejected() {
        let raw = r#"
            [[providers]]
            name = "bad"
            base_url = "https://api.bad.example"
            cost_per_request = 0.01
            requests_per_minute = 60
            reliability = 1.5
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
