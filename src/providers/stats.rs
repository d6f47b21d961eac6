/// Per-provider request statistics
///
/// Every routed call records its outcome here; the monitor samples
/// these to compute error rates and latency alerts, and the
/// optimization report uses the cost totals.
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Snapshot handed to monitoring and exports
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl ProviderStats {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

#[derive(Default)]
struct StatsInner {
    requests: u64,
    successes: u64,
    failures: u64,
    total_cost: f64,
    total_latency_ms: f64,
    last_error: Option<String>,
    last_request_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct ProviderStatsTracker {
    inner: RwLock<StatsInner>,
}

impl ProviderStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency_ms: f64, cost: f64) {
        let mut inner = self.inner.write();
        inner.requests += 1;
        inner.successes += 1;
        inner.total_cost += cost;
        inner.total_latency_ms += latency_ms;
        inner.last_request_at = Some(Utc::now());
    }

    pub fn record_failure(&self, latency_ms: f64, error: &str) {
        let mut inner = self.inner.write();
        inner.requests += 1;
        inner.failures += 1;
        inner.total_latency_ms += latency_ms;
        inner.last_error = Some(error.to_string());
        inner.last_request_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> ProviderStats {
        let inner = self.inner.read();
        ProviderStats {
            requests: inner.requests,
            successes: inner.successes,
            failures: inner.failures,
            total_cost: inner.total_cost,
            avg_latency_ms: if inner.requests == 0 {
                0.0
            } else {
                inner.total_latency_ms / inner.requests as f64
            },
            last_error: inner.last_error.clone(),
            last_request_at: inner.last_request_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_and_error_rate_aggregation() {
        let tracker = ProviderStatsTracker::new();
        tracker.record_success(100.0, 0.01);
        tracker.record_success(300.0, 0.01);
        tracker.record_failure(200.0, "HTTP 503");

        let stats = tracker.snapshot();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.successes, 2);
        assert!((stats.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((stats.error_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.last_error.as_deref(), Some("HTTP 503"));
    }
}
