/// Cache entry with TTL and access tracking
///
/// Expiry is a property of the entry itself (`created_at + ttl`), not
/// of the tier holding it. Both tiers call `is_expired` on read, so a
/// stale row surviving in the backing store is never served.
use crate::types::Priority;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub ttl_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    /// What one origin fetch for this key cost when the entry was written
    pub origin_cost: f64,
    /// Accumulated dollars saved by hits on this entry
    pub cost_saved: f64,
    pub priority: Priority,
    pub tags: BTreeSet<String>,
}

impl<T> CacheEntry<T> {
    pub fn new(
        key: String,
        value: T,
        ttl_seconds: u64,
        priority: Priority,
        tags: BTreeSet<String>,
        origin_cost: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            value,
            ttl_seconds,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            origin_cost,
            cost_saved: 0.0,
            priority,
            tags,
        }
    }

    /// Logically expired when `now` has passed `created_at + ttl`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.created_at + Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Record a read hit: bump stats and credit the avoided fetch cost
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed_at = Utc::now();
        self.cost_saved += self.origin_cost;
    }

    /// Observed reads per hour since creation. The elapsed window is
    /// floored so a brand-new entry with two reads does not report an
    /// absurd rate.
    pub fn access_rate_per_hour_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_secs = (now - self.created_at).num_seconds().max(0) as f64;
        let hours = (elapsed_secs / 3600.0).max(0.1);
        self.access_count as f64 / hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl_seconds: u64) -> CacheEntry<String> {
        CacheEntry::new(
            "stats:teams/roster:team=bos".to_string(),
            "payload".to_string(),
            ttl_seconds,
            Priority::Medium,
            BTreeSet::new(),
            0.01,
        )
    }

    #[test]
    fn test_expiry_is_relative_to_creation() {
        let e = entry(30);
        assert!(!e.is_expired_at(e.created_at + Duration::seconds(30)));
        assert!(e.is_expired_at(e.created_at + Duration::seconds(31)));
    }

    #[test]
    fn test_touch_accumulates_savings() {
        let mut e = entry(60);
        e.touch();
        e.touch();
        assert_eq!(e.access_count, 2);
        assert!((e.cost_saved - 0.02).abs() < 1e-9);
        assert!(e.last_accessed_at >= e.created_at);
    }
}
