/// In-process cache tier (L1) with LRU eviction
///
/// Thread-safe, bounded by entry count. Expiry is checked lazily on
/// read against each entry's own TTL. Eviction removes from this tier
/// only; the shared tier's copy stays authoritative.
use super::entry::CacheEntry;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// L1 counters for monitoring
#[derive(Debug, Clone, Default)]
pub struct MemoryMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub inserts: u64,
}

pub struct MemoryCache {
    capacity: usize,
    data: RwLock<HashMap<String, CacheEntry<Value>>>,
    access_order: RwLock<VecDeque<String>>,
    metrics: RwLock<MemoryMetrics>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: RwLock::new(HashMap::new()),
            access_order: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(MemoryMetrics::default()),
        }
    }

    /// Get a live entry, touching its access stats.
    /// Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<CacheEntry<Value>> {
        let mut data = self.data.write();

        if let Some(entry) = data.get_mut(key) {
            if entry.is_expired() {
                data.remove(key);
                self.remove_from_access_order(key);

                let mut metrics = self.metrics.write();
                metrics.misses += 1;
                metrics.expirations += 1;
                return None;
            }

            entry.touch();
            self.update_access_order(key);

            let mut metrics = self.metrics.write();
            metrics.hits += 1;

            Some(entry.clone())
        } else {
            self.metrics.write().misses += 1;
            None
        }
    }

    /// Insert an entry, evicting the least-recently-accessed key if at
    /// capacity. Returns the evicted key, if any.
    pub fn insert(&self, entry: CacheEntry<Value>) -> Option<String> {
        let mut data = self.data.write();

        let evicted = if data.len() >= self.capacity && !data.contains_key(&entry.key) {
            self.evict_lru(&mut data)
        } else {
            None
        };

        let key = entry.key.clone();
        data.insert(key.clone(), entry);
        self.update_access_order(&key);
        self.metrics.write().inserts += 1;

        evicted
    }

    /// Remove one key. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.data.write().remove(key).is_some();
        if removed {
            self.remove_from_access_order(key);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.data.write().clear();
        self.access_order.write().clear();
    }

    pub fn metrics(&self) -> MemoryMetrics {
        self.metrics.read().clone()
    }

    /// Remove expired entries eagerly. Returns how many were dropped.
    /// Reads already skip expired entries; this just reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let mut data = self.data.write();
        let expired: Vec<String> = data
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            data.remove(key);
            self.remove_from_access_order(key);
        }

        self.metrics.write().expirations += expired.len() as u64;
        expired.len()
    }

    fn evict_lru(&self, data: &mut HashMap<String, CacheEntry<Value>>) -> Option<String> {
        let mut access_order = self.access_order.write();

        if let Some(lru_key) = access_order.pop_front() {
            data.remove(&lru_key);
            self.metrics.write().evictions += 1;
            Some(lru_key)
        } else {
            None
        }
    }

    fn update_access_order(&self, key: &str) {
        let mut access_order = self.access_order.write();
        access_order.retain(|k| k != key);
        access_order.push_back(key.to_string());
    }

    fn remove_from_access_order(&self, key: &str) {
        self.access_order.write().retain(|k| k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn entry(key: &str, ttl_seconds: u64) -> CacheEntry<Value> {
        CacheEntry::new(
            key.to_string(),
            json!({"v": key}),
            ttl_seconds,
            Priority::High,
            BTreeSet::new(),
            0.01,
        )
    }

    #[test]
    fn test_basic_operations() {
        let cache = MemoryCache::new(100);

        cache.insert(entry("key1", 60));
        assert!(cache.get("key1").is_some());
        assert!(cache.get("nonexistent").is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn test_expired_entry_not_returned() {
        let cache = MemoryCache::new(100);

        let mut e = entry("key", 30);
        // backdate creation so the entry is already past its TTL
        e.created_at = chrono::Utc::now() - chrono::Duration::seconds(31);
        cache.insert(e);

        assert!(cache.get("key").is_none());
        assert_eq!(cache.metrics().expirations, 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = MemoryCache::new(2);

        cache.insert(entry("key1", 60));
        cache.insert(entry("key2", 60));

        // touch key1 so key2 becomes the LRU
        cache.get("key1");

        let evicted = cache.insert(entry("key3", 60));
        assert_eq!(evicted, Some("key2".to_string()));

        assert!(cache.get("key1").is_some());
        assert!(cache.get("key2").is_none());
        assert!(cache.get("key3").is_some());
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn test_inserting_n_plus_one_evicts_exactly_one() {
        let n = 5;
        let cache = MemoryCache::new(n);

        for i in 0..=n {
            cache.insert(entry(&format!("key{}", i), 60));
        }

        assert_eq!(cache.len(), n);
        assert_eq!(cache.metrics().evictions, 1);
        // key0 was the least recently accessed
        assert!(!cache.contains("key0"));
    }

    #[test]
    fn test_purge_expired() {
        let cache = MemoryCache::new(10);

        let mut stale = entry("stale", 10);
        stale.created_at = chrono::Utc::now() - chrono::Duration::seconds(60);
        cache.insert(stale);
        cache.insert(entry("fresh", 600));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("fresh"));
    }
}
