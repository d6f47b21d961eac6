//! Tiered cache: in-process L1 over a shared SQLite L2
//!
//! L1 is a small LRU holding hot and high-priority entries; L2 is the
//! authoritative shared tier. Reads check L1 first, then L2, promoting
//! keys that are read frequently. A failing L2 degrades to a miss and
//! the read path continues to origin.

mod entry;
mod memory;
mod store;
mod ttl;

pub use entry::CacheEntry;
pub use memory::{MemoryCache, MemoryMetrics};
pub use store::SqliteStore;
pub use ttl::{base_ttl_seconds, ttl_seconds};

use crate::config::CacheSettings;
use crate::errors::{FeedError, FeedResult};
use crate::events::{self, CacheTier, FeedEvent};
use crate::logger::{self, LogTag};
use crate::types::{DataType, Priority};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Aggregate counters across both tiers
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub invalidations: u64,
    pub promotions: u64,
    pub rejected_oversize: u64,
    pub cost_saved_total: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn lookups(&self) -> u64 {
        self.l1_hits + self.l2_hits + self.misses
    }
}

/// Per-key read counter over a rolling one-hour window
struct HotWindow {
    window_start: Instant,
    count: u32,
}

pub struct TieredCache {
    settings: CacheSettings,
    l1: MemoryCache,
    store: SqliteStore,
    /// tag -> keys carrying it (covers L1-only entries the L2 table
    /// cannot know about)
    tag_index: RwLock<HashMap<String, BTreeSet<String>>>,
    /// key -> its tags, for precise index cleanup on invalidation
    key_tags: RwLock<HashMap<String, BTreeSet<String>>>,
    hot_tracker: Mutex<HashMap<String, HotWindow>>,
    stats: RwLock<CacheStats>,
}

impl TieredCache {
    pub fn new(settings: CacheSettings) -> FeedResult<Self> {
        let store = SqliteStore::open(&settings.store_path)?;
        Ok(Self::with_store(settings, store))
    }

    /// Build over an explicit store (tests use the in-memory database)
    pub fn with_store(settings: CacheSettings, store: SqliteStore) -> Self {
        Self {
            l1: MemoryCache::new(settings.l1_capacity),
            store,
            settings,
            tag_index: RwLock::new(HashMap::new()),
            key_tags: RwLock::new(HashMap::new()),
            hot_tracker: Mutex::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Cache-first read. Never returns an expired value; never fails
    /// because the shared tier is down.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.record_access(key);

        if let Some(entry) = self.l1.get(key) {
            let mut stats = self.stats.write();
            stats.l1_hits += 1;
            stats.cost_saved_total += entry.origin_cost;
            drop(stats);

            events::emit(FeedEvent::CacheHit {
                key: key.to_string(),
                tier: CacheTier::L1,
                cost_saved: entry.origin_cost,
            });
            return Some(entry.value);
        }

        match self.store.get(key) {
            Ok(Some(entry)) => {
                let mut stats = self.stats.write();
                stats.l2_hits += 1;
                stats.cost_saved_total += entry.origin_cost;
                drop(stats);

                if self.is_frequently_accessed(key, &entry) {
                    self.l1.insert(entry.clone());
                    self.stats.write().promotions += 1;
                    logger::debug(
                        LogTag::Cache,
                        &format!("Promoted hot key to L1: {}", key),
                    );
                }

                events::emit(FeedEvent::CacheHit {
                    key: key.to_string(),
                    tier: CacheTier::L2,
                    cost_saved: entry.origin_cost,
                });
                Some(entry.value)
            }
            Ok(None) => {
                self.stats.write().misses += 1;
                events::emit(FeedEvent::CacheMiss {
                    key: key.to_string(),
                });
                None
            }
            Err(err) => {
                // degraded mode: L2 trouble is a miss, not a failure
                logger::warning(
                    LogTag::Store,
                    &format!("Shared tier read failed for {}: {}", key, err),
                );
                self.stats.write().misses += 1;
                events::emit(FeedEvent::CacheMiss {
                    key: key.to_string(),
                });
                None
            }
        }
    }

    /// Write a freshly fetched value into the tiers.
    ///
    /// TTL comes from the data-type/priority policy. Returns
    /// SizeLimitExceeded when the serialized value is too large for
    /// the shared tier; the caller still owns the value and must hand
    /// it to the consumer.
    pub fn set(
        &self,
        key: &str,
        value: Value,
        data_type: DataType,
        priority: Priority,
        tags: &[String],
        origin_cost: f64,
    ) -> FeedResult<()> {
        let ttl = ttl_seconds(data_type, priority);
        let tag_set: BTreeSet<String> = tags.iter().cloned().collect();

        let entry = CacheEntry::new(
            key.to_string(),
            value,
            ttl,
            priority,
            tag_set.clone(),
            origin_cost,
        );

        self.index_tags(key, &tag_set);
        self.stats.write().writes += 1;

        let hot = self.is_hot(key);
        if matches!(priority, Priority::High | Priority::Critical) || hot {
            self.l1.insert(entry.clone());
        }

        let serialized_size = serde_json::to_string(&entry.value)?.len();
        if serialized_size > self.settings.max_entry_bytes {
            self.stats.write().rejected_oversize += 1;
            return Err(FeedError::SizeLimitExceeded {
                size: serialized_size,
                limit: self.settings.max_entry_bytes,
            });
        }

        if let Err(err) = self.store.set(&entry) {
            logger::warning(
                LogTag::Store,
                &format!("Shared tier write failed for {}: {}", key, err),
            );
        }

        Ok(())
    }

    /// Remove one key from both tiers. Returns 1 if the key existed
    /// anywhere, 0 otherwise; invalidating twice is a no-op.
    pub fn invalidate(&self, key: &str) -> usize {
        let in_l1 = self.l1.remove(key);
        let in_l2 = match self.store.remove(key) {
            Ok(removed) => removed,
            Err(err) => {
                logger::warning(
                    LogTag::Store,
                    &format!("Shared tier delete failed for {}: {}", key, err),
                );
                false
            }
        };

        self.unindex_key(key);

        if in_l1 || in_l2 {
            self.stats.write().invalidations += 1;
            1
        } else {
            0
        }
    }

    pub fn invalidate_keys(&self, keys: &[String]) -> usize {
        keys.iter().map(|key| self.invalidate(key)).sum()
    }

    /// Remove every key carrying any of the tags. Cost is proportional
    /// to the number of tagged keys, not the cache size.
    pub fn invalidate_tags(&self, tags: &[String]) -> usize {
        let mut keys: BTreeSet<String> = BTreeSet::new();

        {
            let index = self.tag_index.read();
            for tag in tags {
                if let Some(tagged) = index.get(tag) {
                    keys.extend(tagged.iter().cloned());
                }
            }
        }

        // L2 may know tagged keys this process never wrote
        for tag in tags {
            match self.store.keys_with_tag(tag) {
                Ok(tagged) => keys.extend(tagged),
                Err(err) => logger::warning(
                    LogTag::Store,
                    &format!("Tag lookup failed for {}: {}", tag, err),
                ),
            }
        }

        let keys: Vec<String> = keys.into_iter().collect();
        self.invalidate_keys(&keys)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }

    pub fn l2_len(&self) -> usize {
        self.store.entry_count().unwrap_or(0)
    }

    /// Backstop sweep for both tiers plus index hygiene.
    /// Runs from the background maintenance loop.
    pub fn purge_expired(&self) -> usize {
        let l1_purged = self.l1.purge_expired();
        let l2_purged = match self.store.purge_expired() {
            Ok(count) => count,
            Err(err) => {
                logger::warning(LogTag::Store, &format!("Expiry sweep failed: {}", err));
                0
            }
        };

        self.prune_indexes();
        self.prune_hot_tracker();

        l1_purged + l2_purged
    }

    fn record_access(&self, key: &str) {
        let mut tracker = self.hot_tracker.lock();
        let now = Instant::now();
        let window = tracker.entry(key.to_string()).or_insert(HotWindow {
            window_start: now,
            count: 0,
        });

        // roll the window every hour
        if now.duration_since(window.window_start).as_secs() >= 3_600 {
            window.window_start = now;
            window.count = 0;
        }
        window.count += 1;
    }

    /// Reads-per-hour estimate from the rolling window. The elapsed
    /// time is floored so a burst of reads right after startup counts.
    fn is_hot(&self, key: &str) -> bool {
        let tracker = self.hot_tracker.lock();
        let Some(window) = tracker.get(key) else {
            return false;
        };
        let hours = (window.window_start.elapsed().as_secs_f64() / 3600.0).max(0.1);
        window.count as f64 / hours > self.settings.promotion_reads_per_hour
    }

    fn is_frequently_accessed(&self, key: &str, entry: &CacheEntry<Value>) -> bool {
        self.is_hot(key)
            || entry.access_rate_per_hour_at(chrono::Utc::now())
                > self.settings.promotion_reads_per_hour
    }

    fn index_tags(&self, key: &str, tags: &BTreeSet<String>) {
        // drop stale memberships from a previous set() with other tags
        self.unindex_key(key);
        if tags.is_empty() {
            return;
        }

        {
            let mut index = self.tag_index.write();
            for tag in tags {
                index.entry(tag.clone()).or_default().insert(key.to_string());
            }
        }
        self.key_tags.write().insert(key.to_string(), tags.clone());
    }

    fn unindex_key(&self, key: &str) {
        let Some(tags) = self.key_tags.write().remove(key) else {
            return;
        };
        let mut index = self.tag_index.write();
        for tag in &tags {
            if let Some(keys) = index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(tag);
                }
            }
        }
    }

    /// Drop index entries whose keys are gone from both tiers
    fn prune_indexes(&self) {
        let keys: Vec<String> = self.key_tags.read().keys().cloned().collect();
        for key in keys {
            let in_l1 = self.l1.contains(&key);
            let in_l2 = self.store.contains(&key).unwrap_or(false);
            if !in_l1 && !in_l2 {
                self.unindex_key(&key);
            }
        }
    }

    fn prune_hot_tracker(&self) {
        let mut tracker = self.hot_tracker.lock();
        tracker.retain(|_, window| window.window_start.elapsed().as_secs() < 7_200);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> TieredCache {
        let settings = CacheSettings {
            l1_capacity: 4,
            promotion_reads_per_hour: 10.0,
            max_entry_bytes: 1024,
            store_path: String::new(),
            cleanup_interval_secs: 600,
        };
        TieredCache::with_store(settings, SqliteStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_miss_then_set_then_hit() {
        let cache = cache();
        assert!(cache.get("market:prices:symbol=sol").is_none());

        cache
            .set(
                "market:prices:symbol=sol",
                json!({"price": 172.4}),
                DataType::Market,
                Priority::Medium,
                &[],
                0.01,
            )
            .unwrap();

        let value = cache.get("market:prices:symbol=sol").unwrap();
        assert_eq!(value["price"], 172.4);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.l2_hits, 1);
    }

    #[test]
    fn test_high_priority_lands_in_l1() {
        let cache = cache();
        cache
            .set(
                "live:scores:game=7",
                json!({"home": 88}),
                DataType::Live,
                Priority::High,
                &[],
                0.01,
            )
            .unwrap();

        assert_eq!(cache.l1_len(), 1);
        cache.get("live:scores:game=7");
        assert_eq!(cache.stats().l1_hits, 1);
    }

    #[test]
    fn test_medium_priority_cold_key_skips_l1() {
        let cache = cache();
        cache
            .set(
                "stats:teams:id=9",
                json!({"wins": 41}),
                DataType::Stats,
                Priority::Medium,
                &[],
                0.01,
            )
            .unwrap();

        assert_eq!(cache.l1_len(), 0);
        // still served from L2
        assert!(cache.get("stats:teams:id=9").is_some());
    }

    #[test]
    fn test_l1_eviction_keeps_l2_copy() {
        let cache = cache(); // l1 capacity 4
        for i in 0..5 {
            cache
                .set(
                    &format!("live:scores:game={}", i),
                    json!({"game": i}),
                    DataType::Live,
                    Priority::High,
                    &[],
                    0.01,
                )
                .unwrap();
        }

        // exactly one eviction: the least recently used key
        assert_eq!(cache.l1_len(), 4);
        // the evicted entry is still retrievable (from L2)
        assert!(cache.get("live:scores:game=0").is_some());
    }

    #[test]
    fn test_oversize_value_rejected_not_stored() {
        let cache = cache(); // 1 KiB cap
        let big = json!({"blob": "x".repeat(4096)});

        let err = cache
            .set(
                "historical:seasons:year=2020",
                big,
                DataType::Historical,
                Priority::Medium,
                &[],
                0.01,
            )
            .unwrap_err();

        assert!(matches!(err, FeedError::SizeLimitExceeded { .. }));
        assert_eq!(cache.l2_len(), 0);
    }

    #[test]
    fn test_tag_invalidation_removes_only_tagged() {
        let cache = cache();
        for (key, tags) in [
            ("odds:lines:game=1", vec!["nba".to_string()]),
            ("odds:lines:game=2", vec!["nba".to_string(), "live".to_string()]),
            ("odds:lines:game=3", vec!["nhl".to_string()]),
        ] {
            cache
                .set(key, json!({}), DataType::Odds, Priority::Medium, &tags, 0.01)
                .unwrap();
        }

        assert_eq!(cache.invalidate_tags(&["nba".to_string()]), 2);
        assert!(cache.get("odds:lines:game=1").is_none());
        assert!(cache.get("odds:lines:game=2").is_none());
        assert!(cache.get("odds:lines:game=3").is_some());
    }

    #[test]
    fn test_invalidation_is_idempotent() {
        let cache = cache();
        cache
            .set(
                "stats:players:id=30",
                json!({"ppg": 27.1}),
                DataType::Stats,
                Priority::Medium,
                &["nba".to_string()],
                0.01,
            )
            .unwrap();

        assert_eq!(cache.invalidate("stats:players:id=30"), 1);
        assert_eq!(cache.invalidate("stats:players:id=30"), 0);
        // no orphaned tag-index entries left behind
        assert_eq!(cache.invalidate_tags(&["nba".to_string()]), 0);
    }
}
