/// Shared domain types for requests flowing through the cache and router
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of data a request is for. Drives TTL policy and provider
/// specialty matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Prices, order books, quotes. Highly volatile.
    Market,
    /// Betting odds. Volatile around events.
    Odds,
    /// Live scores and in-play feeds.
    Live,
    /// Season/player statistics. Slow moving.
    Stats,
    /// Settled results and past seasons. Effectively immutable.
    Historical,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Market => "market",
            DataType::Odds => "odds",
            DataType::Live => "live",
            DataType::Stats => "stats",
            DataType::Historical => "historical",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request priority. Affects TTL (Critical caps it, Low stretches it)
/// and L1 placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// A single data request as issued by a consumer.
///
/// `max_cost` is a hard ceiling: no provider above it may be chosen.
/// `required_by` is a deadline; the router will not pick a provider it
/// cannot plausibly satisfy in time, and in-flight calls past the
/// deadline surface a timeout to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    pub endpoint: String,
    /// BTreeMap so the canonical cache key iterates params in sorted order
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub data_type: DataType,
    #[serde(default)]
    pub priority: Priority,
    /// Hard per-request cost ceiling in dollars. None = unbounded.
    #[serde(default)]
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub required_by: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub cacheable: bool,
    #[serde(default)]
    pub batchable: bool,
    /// Skip the cache read (the write still happens)
    #[serde(default)]
    pub force_fresh: bool,
    /// Tags attached to the cached entry, for group invalidation
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl DataRequest {
    pub fn new(endpoint: &str, data_type: DataType) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: BTreeMap::new(),
            data_type,
            priority: Priority::default(),
            max_cost: None,
            required_by: None,
            cacheable: true,
            batchable: false,
            force_fresh: false,
            tags: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_cost(mut self, max_cost: f64) -> Self {
        self.max_cost = Some(max_cost);
        self
    }

    pub fn with_required_by(mut self, deadline: DateTime<Utc>) -> Self {
        self.required_by = Some(deadline);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn batchable(mut self) -> Self {
        self.batchable = true;
        self
    }

    /// Canonical cache key: `<data_type>:<endpoint>:<k=v&k=v>` with
    /// params in sorted order so logically identical requests collide.
    pub fn cache_key(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}:{}:{}", self.data_type, self.endpoint, params.join("&"))
    }

    /// Milliseconds left until the deadline, if one is set.
    /// Negative deadlines clamp to zero.
    pub fn time_remaining_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.required_by
            .map(|deadline| (deadline - now).num_milliseconds().max(0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.trim().is_empty() {
            return Err("endpoint must not be empty".to_string());
        }
        if let Some(max_cost) = self.max_cost {
            if max_cost < 0.0 {
                return Err(format!("max_cost must be >= 0, got {}", max_cost));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_sorts_params() {
        let a = DataRequest::new("events/live", DataType::Live)
            .with_param("league", "nba")
            .with_param("date", "2025-11-02");
        let b = DataRequest::new("events/live", DataType::Live)
            .with_param("date", "2025-11-02")
            .with_param("league", "nba");

        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "live:events/live:date=2025-11-02&league=nba");
    }

    #[test]
    fn test_negative_max_cost_rejected() {
        let req = DataRequest::new("odds/latest", DataType::Odds).with_max_cost(-0.5);
        assert!(req.validate().is_err());
    }
}
