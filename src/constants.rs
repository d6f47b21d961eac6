/// Global tunables for the cache and router
///
/// Values that callers rarely need to change live here; anything
/// deployment-specific is in the config file instead.

/// L1 entry count bound (LRU eviction past this)
pub const DEFAULT_L1_CAPACITY: usize = 1_000;

/// Reads per hour above which a key counts as frequently accessed
/// (drives L2 -> L1 promotion and L1 placement on writes)
pub const HOT_KEY_READS_PER_HOUR: f64 = 10.0;

/// Largest serialized entry the shared tier will accept, in bytes
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 512 * 1024;

/// Reference cost ceiling for the provider cost-efficiency score, in dollars
pub const COST_EFFICIENCY_CEILING: f64 = 0.10;

/// TTL ceiling applied to critical-priority entries, in seconds
pub const CRITICAL_TTL_CAP_SECS: u64 = 30;

/// TTL multiplier for low-priority entries (tolerate staler data)
pub const LOW_PRIORITY_TTL_FACTOR: u64 = 3;

/// Upper bound on a single rate-limit capacity wait, in milliseconds
pub const RATE_WAIT_MAX_MS: u64 = 30_000;

/// Fallback poll interval when a window has no recorded timestamps yet
pub const RATE_WAIT_POLL_MS: u64 = 1_000;

/// Default monitor sampling interval, in seconds
pub const MONITOR_SAMPLE_INTERVAL_SECS: u64 = 30;

/// Breach-free time before an active alert resolves, in seconds
pub const ALERT_QUIET_PERIOD_SECS: u64 = 300;

/// L2 expired-row sweep cadence, in seconds. The sweep is a backstop;
/// reads check expiry themselves.
pub const STORE_CLEANUP_INTERVAL_SECS: u64 = 600;

/// Default HTTP timeout for provider calls, in seconds
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Most requests a single batched provider call may carry
pub const MAX_BATCH_SIZE: usize = 30;
