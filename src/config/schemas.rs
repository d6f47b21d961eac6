/// Configuration schemas with embedded defaults
///
/// Every struct deserializes from `data/config.toml`; missing fields
/// fall back to the defaults below so a partial file is always valid.
use crate::constants;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub budget: BudgetSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Tiered cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// L1 entry count bound (LRU eviction past this)
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,

    /// Reads per hour above which a key is promoted to L1
    #[serde(default = "default_promotion_threshold")]
    pub promotion_reads_per_hour: f64,

    /// Largest serialized entry the shared tier accepts, in bytes
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: usize,

    /// SQLite file backing the shared tier
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Expired-row sweep cadence for the shared tier, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            promotion_reads_per_hour: default_promotion_threshold(),
            max_entry_bytes: default_max_entry_bytes(),
            store_path: default_store_path(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

/// Spend budgets, in dollars per window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSettings {
    #[serde(default = "default_hourly_limit")]
    pub hourly_limit: f64,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: f64,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: f64,

    /// Percentage of a window limit that triggers a cost warning
    #[serde(default = "default_warning_pct")]
    pub warning_threshold_pct: f64,

    /// Which windows hard-block when their limit would be passed.
    /// Hourly blocks by default since it bounds worst-case burn rate;
    /// daily and monthly warn only.
    #[serde(default = "default_true")]
    pub block_hourly: bool,
    #[serde(default)]
    pub block_daily: bool,
    #[serde(default)]
    pub block_monthly: bool,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            hourly_limit: default_hourly_limit(),
            daily_limit: default_daily_limit(),
            monthly_limit: default_monthly_limit(),
            warning_threshold_pct: default_warning_pct(),
            block_hourly: true,
            block_daily: false,
            block_monthly: false,
        }
    }
}

/// Monitoring thresholds and cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Breach-free time before an active alert resolves, in seconds
    #[serde(default = "default_quiet_period")]
    pub quiet_period_secs: u64,

    /// Hit-rate floor: below warning -> Warning, below critical -> Critical
    #[serde(default = "default_hit_rate_warning")]
    pub hit_rate_warning: f64,
    #[serde(default = "default_hit_rate_critical")]
    pub hit_rate_critical: f64,

    /// Average fetch latency ceilings, in milliseconds
    #[serde(default = "default_latency_warning_ms")]
    pub latency_warning_ms: f64,
    #[serde(default = "default_latency_critical_ms")]
    pub latency_critical_ms: f64,

    /// Spend-to-budget ratio ceilings for the hourly window
    #[serde(default = "default_spend_ratio_warning")]
    pub spend_ratio_warning: f64,
    #[serde(default = "default_spend_ratio_critical")]
    pub spend_ratio_critical: f64,

    /// Provider error-rate ceilings
    #[serde(default = "default_error_rate_warning")]
    pub error_rate_warning: f64,
    #[serde(default = "default_error_rate_critical")]
    pub error_rate_critical: f64,

    /// Minimum samples before hit-rate/error-rate alerts fire
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
            quiet_period_secs: default_quiet_period(),
            hit_rate_warning: default_hit_rate_warning(),
            hit_rate_critical: default_hit_rate_critical(),
            latency_warning_ms: default_latency_warning_ms(),
            latency_critical_ms: default_latency_critical_ms(),
            spend_ratio_warning: default_spend_ratio_warning(),
            spend_ratio_critical: default_spend_ratio_critical(),
            error_rate_warning: default_error_rate_warning(),
            error_rate_critical: default_error_rate_critical(),
            min_samples: default_min_samples(),
        }
    }
}

/// One metered upstream provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,

    /// Estimated cost per request, in dollars
    pub cost_per_request: f64,

    pub requests_per_minute: u32,
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
    #[serde(default = "default_requests_per_day")]
    pub requests_per_day: u32,

    /// Historical success rate, 0..=1
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    /// Data quality score, 0..=1
    #[serde(default = "default_data_quality")]
    pub data_quality: f64,

    /// Data types this provider serves; "all" is a wildcard
    #[serde(default = "default_specialties")]
    pub specialties: Vec<String>,

    /// Tiebreak when scores are equal; lower wins
    #[serde(default = "default_fallback_priority")]
    pub fallback_priority: u32,

    /// Expected response latency, for deadline feasibility checks
    #[serde(default = "default_avg_latency_ms")]
    pub avg_latency_ms: u64,

    #[serde(default)]
    pub supports_batch: bool,

    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_l1_capacity() -> usize {
    constants::DEFAULT_L1_CAPACITY
}
fn default_promotion_threshold() -> f64 {
    constants::HOT_KEY_READS_PER_HOUR
}
fn default_max_entry_bytes() -> usize {
    constants::DEFAULT_MAX_ENTRY_BYTES
}
fn default_store_path() -> String {
    "data/feedcache.db".to_string()
}
fn default_cleanup_interval() -> u64 {
    constants::STORE_CLEANUP_INTERVAL_SECS
}
fn default_hourly_limit() -> f64 {
    5.0
}
fn default_daily_limit() -> f64 {
    50.0
}
fn default_monthly_limit() -> f64 {
    1_000.0
}
fn default_warning_pct() -> f64 {
    80.0
}
fn default_sample_interval() -> u64 {
    constants::MONITOR_SAMPLE_INTERVAL_SECS
}
fn default_quiet_period() -> u64 {
    constants::ALERT_QUIET_PERIOD_SECS
}
fn default_hit_rate_warning() -> f64 {
    0.60
}
fn default_hit_rate_critical() -> f64 {
    0.30
}
fn default_latency_warning_ms() -> f64 {
    1_500.0
}
fn default_latency_critical_ms() -> f64 {
    5_000.0
}
fn default_spend_ratio_warning() -> f64 {
    0.80
}
fn default_spend_ratio_critical() -> f64 {
    0.95
}
fn default_error_rate_warning() -> f64 {
    0.10
}
fn default_error_rate_critical() -> f64 {
    0.30
}
fn default_min_samples() -> u64 {
    20
}
fn default_requests_per_hour() -> u32 {
    3_600
}
fn default_requests_per_day() -> u32 {
    86_400
}
fn default_reliability() -> f64 {
    0.90
}
fn default_data_quality() -> f64 {
    0.80
}
fn default_specialties() -> Vec<String> {
    vec!["all".to_string()]
}
fn default_fallback_priority() -> u32 {
    100
}
fn default_avg_latency_ms() -> u64 {
    500
}
fn default_provider_timeout() -> u64 {
    constants::PROVIDER_TIMEOUT_SECS
}
fn default_true() -> bool {
    true
}
