//! Metrics sampling, alert evaluation, health checks, and export
//!
//! A background loop samples cache, provider, and budget figures at a
//! fixed cadence, runs them through the alert state machine, and
//! emits alert events. Snapshots and exports read the same figures
//! synchronously for readiness probes and offline analysis.

mod alerts;

pub use alerts::{AlertKind, AlertManager, AlertRecord, Severity};

use crate::config::MonitorSettings;
use crate::errors::{FeedError, FeedResult};
use crate::events::{self, FeedEvent};
use crate::logger::{self, LogTag};
use crate::service::DataService;
use crate::utils::check_shutdown_or_delay;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub hit_rate: f64,
    pub lookups: u64,
    pub l1_entries: usize,
    pub l2_entries: usize,
    pub cost_saved: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub provider_requests: u64,
    pub hourly_spent: f64,
    pub hourly_limit: f64,
    pub spend_ratio: f64,
    pub active_alerts: Vec<AlertRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub hit_rate: f64,
    pub spend_ratio: f64,
    pub active_alerts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

pub struct Monitor {
    settings: MonitorSettings,
    service: Arc<DataService>,
    alerts: AlertManager,
}

impl Monitor {
    pub fn new(service: Arc<DataService>, settings: MonitorSettings) -> Self {
        let quiet = settings.quiet_period_secs;
        Self {
            settings,
            service,
            alerts: AlertManager::new(quiet),
        }
    }

    /// Periodic sampling loop; lives until shutdown fires
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        let interval = Duration::from_secs(self.settings.sample_interval_secs.max(1));
        logger::info(
            LogTag::Monitor,
            &format!("Monitor sampling every {:?}", interval),
        );

        loop {
            if check_shutdown_or_delay(&shutdown, interval).await {
                logger::info(LogTag::Monitor, "Monitor loop shutting down");
                break;
            }
            self.sample();
        }
    }

    /// One evaluation pass over all alert kinds
    pub fn sample(&self) {
        let snapshot = self.metrics_snapshot();

        if snapshot.lookups >= self.settings.min_samples {
            self.evaluate(
                AlertKind::HitRate,
                // hit rate alerts fire when the metric drops BELOW the line
                Self::severity_low(
                    snapshot.hit_rate,
                    self.settings.hit_rate_warning,
                    self.settings.hit_rate_critical,
                ),
                &format!("Cache hit rate at {:.0}%", snapshot.hit_rate * 100.0),
            );
        }

        if snapshot.provider_requests >= self.settings.min_samples {
            self.evaluate(
                AlertKind::Latency,
                Self::severity_high(
                    snapshot.avg_latency_ms,
                    self.settings.latency_warning_ms,
                    self.settings.latency_critical_ms,
                ),
                &format!("Average fetch latency {:.0} ms", snapshot.avg_latency_ms),
            );

            self.evaluate(
                AlertKind::ErrorRate,
                Self::severity_high(
                    snapshot.error_rate,
                    self.settings.error_rate_warning,
                    self.settings.error_rate_critical,
                ),
                &format!("Provider error rate {:.0}%", snapshot.error_rate * 100.0),
            );
        }

        self.evaluate(
            AlertKind::SpendRate,
            Self::severity_high(
                snapshot.spend_ratio,
                self.settings.spend_ratio_warning,
                self.settings.spend_ratio_critical,
            ),
            &format!(
                "Hourly spend at {:.0}% of budget ({:.4} / {:.4})",
                snapshot.spend_ratio * 100.0,
                snapshot.hourly_spent,
                snapshot.hourly_limit
            ),
        );
    }

    /// Synchronous snapshot for probes and exports
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let cache_stats = self.service.cache().stats();
        let budget = self.service.router().budget().snapshot();

        let mut total_requests = 0u64;
        let mut total_failures = 0u64;
        let mut weighted_latency = 0.0f64;
        for handle in self.service.router().registry().all() {
            let stats = handle.stats.snapshot();
            total_requests += stats.requests;
            total_failures += stats.failures;
            weighted_latency += stats.avg_latency_ms * stats.requests as f64;
        }

        let avg_latency_ms = if total_requests == 0 {
            0.0
        } else {
            weighted_latency / total_requests as f64
        };
        let error_rate = if total_requests == 0 {
            0.0
        } else {
            total_failures as f64 / total_requests as f64
        };

        MetricsSnapshot {
            generated_at: Utc::now(),
            hit_rate: cache_stats.hit_rate(),
            lookups: cache_stats.lookups(),
            l1_entries: self.service.cache().l1_len(),
            l2_entries: self.service.cache().l2_len(),
            cost_saved: cache_stats.cost_saved_total,
            avg_latency_ms,
            error_rate,
            provider_requests: total_requests,
            hourly_spent: budget.hourly_spent,
            hourly_limit: budget.hourly_limit,
            spend_ratio: budget.hourly_ratio(),
            active_alerts: self.alerts.active_alerts(),
        }
    }

    /// Readiness view: healthy means no critical alert is active
    pub fn health_check(&self) -> HealthStatus {
        let snapshot = self.metrics_snapshot();
        HealthStatus {
            healthy: !self.alerts.has_critical(),
            hit_rate: snapshot.hit_rate,
            spend_ratio: snapshot.spend_ratio,
            active_alerts: snapshot.active_alerts.len(),
        }
    }

    /// Bulk export for external analysis; not on the hot path
    pub fn export_metrics(&self, format: ExportFormat) -> FeedResult<String> {
        let snapshot = self.metrics_snapshot();
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&snapshot)?),
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer
                    .write_record(["metric", "value"])
                    .map_err(|e| FeedError::Io(std::io::Error::other(e)))?;

                let rows: [(&str, String); 10] = [
                    ("hit_rate", format!("{:.4}", snapshot.hit_rate)),
                    ("lookups", snapshot.lookups.to_string()),
                    ("l1_entries", snapshot.l1_entries.to_string()),
                    ("l2_entries", snapshot.l2_entries.to_string()),
                    ("cost_saved", format!("{:.4}", snapshot.cost_saved)),
                    ("avg_latency_ms", format!("{:.1}", snapshot.avg_latency_ms)),
                    ("error_rate", format!("{:.4}", snapshot.error_rate)),
                    ("hourly_spent", format!("{:.4}", snapshot.hourly_spent)),
                    ("spend_ratio", format!("{:.4}", snapshot.spend_ratio)),
                    ("active_alerts", snapshot.active_alerts.len().to_string()),
                ];
                for (metric, value) in rows {
                    writer
                        .write_record([metric, value.as_str()])
                        .map_err(|e| FeedError::Io(std::io::Error::other(e)))?;
                }

                let bytes = writer
                    .into_inner()
                    .map_err(|e| FeedError::Io(std::io::Error::other(e)))?;
                String::from_utf8(bytes)
                    .map_err(|e| FeedError::Io(std::io::Error::other(e)))
            }
        }
    }

    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        self.alerts.active_alerts()
    }

    fn evaluate(&self, kind: AlertKind, severity: Severity, message: &str) {
        if let Some(record) = self.alerts.observe(kind, severity, message) {
            match record.severity {
                Severity::Critical => logger::error(
                    LogTag::Monitor,
                    &format!("CRITICAL alert [{}]: {}", record.kind.as_str(), record.message),
                ),
                _ => logger::warning(
                    LogTag::Monitor,
                    &format!("Warning alert [{}]: {}", record.kind.as_str(), record.message),
                ),
            }
            events::emit(FeedEvent::Alert {
                id: record.id.clone(),
                kind: record.kind.as_str().to_string(),
                severity: record.severity.as_str().to_string(),
                message: record.message.clone(),
                at: record.raised_at,
            });
        }
    }

    /// Severity for metrics that alert when too high
    fn severity_high(value: f64, warning: f64, critical: f64) -> Severity {
        if value >= critical {
            Severity::Critical
        } else if value >= warning {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }

    /// Severity for metrics that alert when too low
    fn severity_low(value: f64, warning: f64, critical: f64) -> Severity {
        if value < critical {
            Severity::Critical
        } else if value < warning {
            Severity::Warning
        } else {
            Severity::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SqliteStore, TieredCache};
    use crate::config::{BudgetSettings, CacheSettings};
    use crate::providers::ProviderClient;
    use crate::router::{BudgetTracker, Provider, ProviderRegistry, ProviderRouter};
    use crate::types::DataRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct NullClient;

    #[async_trait]
    impl ProviderClient for NullClient {
        async fn fetch(&self, _: &Provider, _: &DataRequest) -> FeedResult<Value> {
            Ok(json!({}))
        }
        async fn fetch_batch(
            &self,
            _: &Provider,
            _: &str,
            items: &[DataRequest],
        ) -> FeedResult<Vec<Value>> {
            Ok(items.iter().map(|_| json!({})).collect())
        }
    }

    fn monitor_with(budget: BudgetSettings, settings: MonitorSettings) -> Monitor {
        let cache = Arc::new(TieredCache::with_store(
            CacheSettings::default(),
            SqliteStore::open_in_memory().unwrap(),
        ));
        let router = Arc::new(ProviderRouter::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(BudgetTracker::new(budget)),
            Arc::new(NullClient),
        ));
        let service = Arc::new(DataService::new(cache, router));
        Monitor::new(service, settings)
    }

    #[test]
    fn test_spend_alert_fires_on_high_ratio() {
        let budget = BudgetSettings {
            hourly_limit: 1.0,
            ..Default::default()
        };
        let monitor = monitor_with(budget, MonitorSettings::default());

        // push spend to 90% of the hourly budget
        monitor
            .service
            .router()
            .budget()
            .try_charge(0.9)
            .unwrap();

        monitor.sample();
        let alerts = monitor.active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SpendRate);
        assert_eq!(alerts[0].severity, Severity::Warning);
        // a warning alone does not fail the readiness probe
        assert!(monitor.health_check().healthy);
    }

    #[test]
    fn test_quiet_metrics_raise_nothing() {
        let monitor = monitor_with(BudgetSettings::default(), MonitorSettings::default());
        monitor.sample();
        assert!(monitor.active_alerts().is_empty());
        assert!(monitor.health_check().healthy);
    }

    #[test]
    fn test_export_formats() {
        let monitor = monitor_with(BudgetSettings::default(), MonitorSettings::default());

        let json_out = monitor.export_metrics(ExportFormat::Json).unwrap();
        assert!(json_out.contains("\"hit_rate\""));

        let csv_out = monitor.export_metrics(ExportFormat::Csv).unwrap();
        assert!(csv_out.starts_with("metric,value"));
        assert!(csv_out.contains("hit_rate"));
    }
}
