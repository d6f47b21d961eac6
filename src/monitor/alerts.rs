/// Alert lifecycle: Normal -> Warning -> Critical -> resolved
///
/// An alert is raised when a sampled metric crosses its threshold and
/// resolves only after a full quiet period with no breach, so a metric
/// oscillating around the line does not flap notifications. While
/// active, a worse observation escalates; a better-but-still-breaching
/// one just refreshes the breach time at the existing severity.
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HitRate,
    Latency,
    SpendRate,
    ErrorRate,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HitRate => "hit_rate",
            AlertKind::Latency => "latency",
            AlertKind::SpendRate => "spend_rate",
            AlertKind::ErrorRate => "error_rate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub id: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub last_breach_at: DateTime<Utc>,
}

pub struct AlertManager {
    quiet_period_secs: u64,
    active: Mutex<HashMap<AlertKind, AlertRecord>>,
}

impl AlertManager {
    pub fn new(quiet_period_secs: u64) -> Self {
        Self {
            quiet_period_secs,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one observation for a metric. Returns a record when an
    /// alert is newly raised or escalated (the caller emits it);
    /// refreshes and resolutions return None.
    pub fn observe(&self, kind: AlertKind, severity: Severity, message: &str) -> Option<AlertRecord> {
        self.observe_at(Utc::now(), kind, severity, message)
    }

    pub fn observe_at(
        &self,
        now: DateTime<Utc>,
        kind: AlertKind,
        severity: Severity,
        message: &str,
    ) -> Option<AlertRecord> {
        let mut active = self.active.lock();

        match (active.get_mut(&kind), severity) {
            (None, Severity::Normal) => None,
            (None, _) => {
                let record = AlertRecord {
                    id: Uuid::new_v4().to_string(),
                    kind,
                    severity,
                    message: message.to_string(),
                    raised_at: now,
                    last_breach_at: now,
                };
                active.insert(kind, record.clone());
                Some(record)
            }
            (Some(record), Severity::Normal) => {
                let quiet = now - record.last_breach_at
                    >= Duration::seconds(self.quiet_period_secs as i64);
                if quiet {
                    // resolved: leave the active set, nothing emitted
                    active.remove(&kind);
                }
                None
            }
            (Some(record), severity) => {
                record.last_breach_at = now;
                if severity > record.severity {
                    record.severity = severity;
                    record.message = message.to_string();
                    Some(record.clone())
                } else {
                    None
                }
            }
        }
    }

    pub fn active_alerts(&self) -> Vec<AlertRecord> {
        self.active.lock().values().cloned().collect()
    }

    pub fn has_critical(&self) -> bool {
        self.active
            .lock()
            .values()
            .any(|record| record.severity == Severity::Critical)
    }
}
