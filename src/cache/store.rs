/// Shared cache tier (L2) backed by SQLite
///
/// Multiple processes can point at the same database file. Rows carry
/// an `expires_at` column so sweeps can delete stale data cheaply, but
/// the logical expiry check on read is authoritative: a row that
/// outlives its TTL is never served.
///
/// Tag membership lives in its own table so tag invalidation touches
/// only the tagged keys, never a full scan.
use super::entry::CacheEntry;
use crate::errors::FeedResult;
use crate::types::Priority;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeSet;

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> FeedResult<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(path)?;
        let store = Self { db: Mutex::new(db) };
        store.create_tables()?;
        Ok(store)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> FeedResult<Self> {
        let db = Connection::open_in_memory()?;
        let store = Self { db: Mutex::new(db) };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> FeedResult<()> {
        let db = self.db.lock();

        db.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                ttl_seconds INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed_at INTEGER NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                origin_cost REAL NOT NULL DEFAULT 0,
                cost_saved REAL NOT NULL DEFAULT 0,
                priority TEXT NOT NULL,
                tags TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_expires
             ON cache_entries(expires_at)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS cache_tags (
                tag TEXT NOT NULL,
                key TEXT NOT NULL,
                PRIMARY KEY (tag, key)
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_tags_tag ON cache_tags(tag)",
            [],
        )?;

        Ok(())
    }

    /// Fetch a live entry and record the hit on its row.
    /// Expired rows are deleted on sight and reported as a miss.
    pub fn get(&self, key: &str) -> FeedResult<Option<CacheEntry<Value>>> {
        let db = self.db.lock();

        let row = db
            .query_row(
                "SELECT value, ttl_seconds, created_at, last_accessed_at, access_count,
                        origin_cost, cost_saved, priority, tags
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            raw_value,
            ttl_seconds,
            created_at,
            last_accessed_at,
            access_count,
            origin_cost,
            cost_saved,
            raw_priority,
            raw_tags,
        )) = row
        else {
            return Ok(None);
        };

        let mut entry = CacheEntry {
            key: key.to_string(),
            value: serde_json::from_str(&raw_value)?,
            ttl_seconds: ttl_seconds.max(0) as u64,
            created_at: timestamp(created_at),
            last_accessed_at: timestamp(last_accessed_at),
            access_count: access_count.max(0) as u64,
            origin_cost,
            cost_saved,
            priority: serde_json::from_str::<Priority>(&raw_priority)
                .unwrap_or(Priority::Medium),
            tags: serde_json::from_str::<BTreeSet<String>>(&raw_tags).unwrap_or_default(),
        };

        if entry.is_expired() {
            db.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            db.execute("DELETE FROM cache_tags WHERE key = ?1", params![key])?;
            return Ok(None);
        }

        entry.touch();
        db.execute(
            "UPDATE cache_entries
             SET access_count = ?2, last_accessed_at = ?3, cost_saved = ?4
             WHERE key = ?1",
            params![
                key,
                entry.access_count as i64,
                entry.last_accessed_at.timestamp(),
                entry.cost_saved
            ],
        )?;

        Ok(Some(entry))
    }

    pub fn set(&self, entry: &CacheEntry<Value>) -> FeedResult<()> {
        let value = serde_json::to_string(&entry.value)?;
        let priority = serde_json::to_string(&entry.priority)?;
        let tags = serde_json::to_string(&entry.tags)?;
        let expires_at = entry.created_at.timestamp() + entry.ttl_seconds as i64;

        let db = self.db.lock();

        db.execute(
            "INSERT OR REPLACE INTO cache_entries
             (key, value, ttl_seconds, created_at, last_accessed_at, access_count,
              origin_cost, cost_saved, priority, tags, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.key,
                value,
                entry.ttl_seconds as i64,
                entry.created_at.timestamp(),
                entry.last_accessed_at.timestamp(),
                entry.access_count as i64,
                entry.origin_cost,
                entry.cost_saved,
                priority,
                tags,
                expires_at
            ],
        )?;

        db.execute("DELETE FROM cache_tags WHERE key = ?1", params![entry.key])?;
        for tag in &entry.tags {
            db.execute(
                "INSERT OR IGNORE INTO cache_tags (tag, key) VALUES (?1, ?2)",
                params![tag, entry.key],
            )?;
        }

        Ok(())
    }

    /// Existence check that does not touch access stats.
    /// Expired-but-unswept rows count as absent.
    pub fn contains(&self, key: &str) -> FeedResult<bool> {
        let now = Utc::now().timestamp();
        let db = self.db.lock();
        let found: Option<i64> = db
            .query_row(
                "SELECT 1 FROM cache_entries WHERE key = ?1 AND expires_at >= ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove one key. Returns true if a row was deleted.
    pub fn remove(&self, key: &str) -> FeedResult<bool> {
        let db = self.db.lock();
        let deleted = db.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        db.execute("DELETE FROM cache_tags WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    /// Keys currently carrying a tag
    pub fn keys_with_tag(&self, tag: &str) -> FeedResult<Vec<String>> {
        let db = self.db.lock();
        let mut stmt = db.prepare("SELECT key FROM cache_tags WHERE tag = ?1")?;
        let keys = stmt
            .query_map(params![tag], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Delete all rows past their expiry. Backstop only.
    pub fn purge_expired(&self) -> FeedResult<usize> {
        let now = Utc::now().timestamp();
        let db = self.db.lock();
        let deleted = db.execute(
            "DELETE FROM cache_entries WHERE expires_at < ?1",
            params![now],
        )?;
        db.execute(
            "DELETE FROM cache_tags WHERE key NOT IN (SELECT key FROM cache_entries)",
            [],
        )?;
        Ok(deleted)
    }

    pub fn entry_count(&self) -> FeedResult<usize> {
        let db = self.db.lock();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(key: &str, ttl_seconds: u64, tags: &[&str]) -> CacheEntry<Value> {
        CacheEntry::new(
            key.to_string(),
            json!({"payload": key}),
            ttl_seconds,
            Priority::Medium,
            tags.iter().map(|t| t.to_string()).collect(),
            0.02,
        )
    }

    #[test]
    fn test_set_get_roundtrip_updates_access_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set(&entry("odds:lines/nba:game=1", 60, &["nba"])).unwrap();

        let first = store.get("odds:lines/nba:game=1").unwrap().unwrap();
        assert_eq!(first.access_count, 1);
        assert!((first.cost_saved - 0.02).abs() < 1e-9);

        let second = store.get("odds:lines/nba:game=1").unwrap().unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[test]
    fn test_expired_row_never_served() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut stale = entry("market:prices:symbol=eth", 30, &[]);
        stale.created_at = Utc::now() - chrono::Duration::seconds(120);
        store.set(&stale).unwrap();

        // row exists in the table but is past created_at + ttl
        assert!(store.get("market:prices:symbol=eth").unwrap().is_none());
        // and the lazy check also removed it
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_tag_index_tracks_membership() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set(&entry("a", 60, &["nba", "live"])).unwrap();
        store.set(&entry("b", 60, &["nba"])).unwrap();
        store.set(&entry("c", 60, &["nhl"])).unwrap();

        let mut nba = store.keys_with_tag("nba").unwrap();
        nba.sort();
        assert_eq!(nba, vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.keys_with_tag("nba").unwrap(), vec!["b".to_string()]);
        assert!(store.keys_with_tag("live").unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_is_shared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db").to_string_lossy().to_string();

        let writer = SqliteStore::open(&path).unwrap();
        writer.set(&entry("stats:standings:league=nba", 600, &[])).unwrap();
        drop(writer);

        // a second handle on the same file sees the entry
        let reader = SqliteStore::open(&path).unwrap();
        assert!(reader.get("stats:standings:league=nba").unwrap().is_some());
    }

    #[test]
    fn test_purge_expired_is_backstop() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut stale = entry("stale", 10, &["old"]);
        stale.created_at = Utc::now() - chrono::Duration::seconds(60);
        store.set(&stale).unwrap();
        store.set(&entry("fresh", 600, &[])).unwrap();

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.entry_count().unwrap(), 1);
        assert!(store.keys_with_tag("old").unwrap().is_empty());
    }
}
