/// Provider records and the hot-reloadable registry
///
/// A provider's descriptive record can be swapped at runtime without
/// losing its rate-limiter history or request statistics; limits are
/// rebuilt only when they actually changed.
use super::rate_limit::{RateLimiter, RateLimits};
use crate::config::ProviderConfig;
use crate::logger::{self, LogTag};
use crate::providers::stats::ProviderStatsTracker;
use crate::types::DataType;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// One metered upstream data source
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub cost_per_request: f64,
    pub limits: RateLimits,
    pub reliability: f64,
    pub data_quality: f64,
    pub specialties: BTreeSet<String>,
    pub fallback_priority: u32,
    pub avg_latency_ms: u64,
    pub supports_batch: bool,
    pub timeout_seconds: u64,
    pub enabled: bool,
    pub api_key: Option<String>,
}

impl Provider {
    /// Whether this provider serves the data type ("all" is a wildcard)
    pub fn serves(&self, data_type: DataType) -> bool {
        self.specialties.contains("all") || self.specialties.contains(data_type.as_str())
    }

    /// Declared specialist, as opposed to wildcard coverage
    pub fn is_specialist(&self, data_type: DataType) -> bool {
        self.specialties.contains(data_type.as_str())
    }
}

impl From<&ProviderConfig> for Provider {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            cost_per_request: config.cost_per_request,
            limits: RateLimits {
                per_minute: config.requests_per_minute,
                per_hour: config.requests_per_hour,
                per_day: config.requests_per_day,
            },
            reliability: config.reliability,
            data_quality: config.data_quality,
            specialties: config.specialties.iter().cloned().collect(),
            fallback_priority: config.fallback_priority,
            avg_latency_ms: config.avg_latency_ms,
            supports_batch: config.supports_batch,
            timeout_seconds: config.timeout_seconds,
            enabled: config.enabled,
            api_key: config.api_key.clone(),
        }
    }
}

/// A registered provider with its long-lived runtime state
pub struct ProviderHandle {
    record: RwLock<Provider>,
    pub limiter: RateLimiter,
    pub stats: ProviderStatsTracker,
}

impl ProviderHandle {
    fn new(provider: Provider) -> Self {
        let limits = provider.limits;
        Self {
            record: RwLock::new(provider),
            limiter: RateLimiter::new(limits),
            stats: ProviderStatsTracker::new(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.record.read().clone()
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<ProviderHandle>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        let registry = Self::new();
        for config in configs {
            registry.update_provider(Provider::from(config));
        }
        registry
    }

    /// Insert or hot-swap a provider record.
    ///
    /// An existing handle keeps its rate-limiter history and stats; the
    /// limiter is only rebuilt when the limits themselves changed.
    pub fn update_provider(&self, provider: Provider) {
        let mut providers = self.providers.write();

        match providers.get(&provider.name) {
            Some(handle) => {
                let old_limits = handle.limiter.limits();
                let limits_changed = old_limits.per_minute != provider.limits.per_minute
                    || old_limits.per_hour != provider.limits.per_hour
                    || old_limits.per_day != provider.limits.per_day;

                if limits_changed {
                    logger::info(
                        LogTag::Provider,
                        &format!("Rate limits changed for {}, resetting limiter", provider.name),
                    );
                    providers.insert(provider.name.clone(), Arc::new(ProviderHandle::new(provider)));
                } else {
                    *handle.record.write() = provider;
                }
            }
            None => {
                logger::info(LogTag::Provider, &format!("Registered provider {}", provider.name));
                providers.insert(provider.name.clone(), Arc::new(ProviderHandle::new(provider)));
            }
        }
    }

    pub fn remove_provider(&self, name: &str) -> bool {
        self.providers.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderHandle>> {
        self.providers.read().get(name).cloned()
    }

    /// All enabled providers
    pub fn enabled(&self) -> Vec<Arc<ProviderHandle>> {
        self.providers
            .read()
            .values()
            .filter(|handle| handle.provider().enabled)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<ProviderHandle>> {
        self.providers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_provider(name: &str, cost: f64) -> Provider {
        Provider {
            name: name.to_string(),
            base_url: format!("https://api.{}.example", name),
            cost_per_request: cost,
            limits: RateLimits {
                per_minute: 60,
                per_hour: 3_600,
                per_day: 86_400,
            },
            reliability: 0.95,
            data_quality: 0.9,
            specialties: ["odds".to_string()].into_iter().collect(),
            fallback_priority: 10,
            avg_latency_ms: 200,
            supports_batch: false,
            timeout_seconds: 10,
            enabled: true,
            api_key: None,
        }
    }

    #[test]
    fn test_wildcard_specialty_serves_everything() {
        let mut provider = test_provider("omni", 0.01);
        provider.specialties = ["all".to_string()].into_iter().collect();

        assert!(provider.serves(DataType::Market));
        assert!(provider.serves(DataType::Historical));
        assert!(!provider.is_specialist(DataType::Market));
    }

    #[test]
    fn test_hot_swap_keeps_limiter_history() {
        let registry = ProviderRegistry::new();
        registry.update_provider(test_provider("oddsfeed", 0.01));

        let handle = registry.get("oddsfeed").unwrap();
        assert!(handle.limiter.try_acquire());

        // reprice without touching limits: limiter history survives
        registry.update_provider(test_provider("oddsfeed", 0.02));
        let handle_after = registry.get("oddsfeed").unwrap();
        assert!((handle_after.provider().cost_per_request - 0.02).abs() < 1e-9);
        assert!(handle_after.limiter.utilization() > 0.0);
    }

    #[test]
    fn test_limit_change_rebuilds_limiter() {
        let registry = ProviderRegistry::new();
        registry.update_provider(test_provider("oddsfeed", 0.01));
        registry.get("oddsfeed").unwrap().limiter.try_acquire();

        let mut changed = test_provider("oddsfeed", 0.01);
        changed.limits.per_minute = 10;
        registry.update_provider(changed);

        let handle = registry.get("oddsfeed").unwrap();
        assert_eq!(handle.limiter.limits().per_minute, 10);
        assert_eq!(handle.limiter.utilization(), 0.0);
    }

    #[test]
    fn test_disabled_providers_excluded_from_enabled() {
        let registry = ProviderRegistry::new();
        registry.update_provider(test_provider("a", 0.01));
        let mut disabled = test_provider("b", 0.01);
        disabled.enabled = false;
        registry.update_provider(disabled);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.enabled().len(), 1);
    }
}
