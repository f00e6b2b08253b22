//! Cache manager with typed entries, status-driven TTL, and swappable
//! backing stores.
//!
//! Keys are namespaced strings (`geo:…`, `places:…`, `intent:…`,
//! `provider:<p>:…`) and values are UTF-8 JSON `{value, status, updatedAt}`.
//! The store is either in-process (`MemoryStore`, per-namespace capacity
//! caps) or shared (`RedisStore`). A store failure is a cache miss, never a
//! request failure.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    Found,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    pub status: CacheStatus,
    pub updated_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn found(value: T) -> Self {
        Self {
            value,
            status: CacheStatus::Found,
            updated_at: Utc::now(),
        }
    }

    pub fn not_found(value: T) -> Self {
        Self {
            value,
            status: CacheStatus::NotFound,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    /// SETNX semantics: returns true when the key was absent and is now set.
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

// --- In-process store ---

const DEFAULT_NAMESPACE_CAPACITY: usize = 1000;

struct StoredValue {
    payload: String,
    expires_at: Instant,
}

/// HashMap store with lazy expiry and per-namespace capacity caps. The
/// namespace is the key segment before the first ':'. Lock sections are
/// constant-time apart from the rare eviction scan.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
    capacities: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new(capacities: HashMap<String, usize>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacities,
        }
    }

    fn namespace(key: &str) -> &str {
        key.split(':').next().unwrap_or(key)
    }

    fn capacity_for(&self, namespace: &str) -> usize {
        self.capacities
            .get(namespace)
            .copied()
            .unwrap_or(DEFAULT_NAMESPACE_CAPACITY)
    }

    fn insert_locked(
        &self,
        entries: &mut HashMap<String, StoredValue>,
        key: &str,
        value: String,
        ttl: Duration,
    ) {
        let namespace = Self::namespace(key).to_string();
        let capacity = self.capacity_for(&namespace);

        entries.retain(|_, v| v.expires_at > Instant::now());

        let in_namespace = entries
            .keys()
            .filter(|k| Self::namespace(k) == namespace)
            .count();
        if in_namespace >= capacity {
            // Evict the soonest-expiring entry of this namespace.
            if let Some(victim) = entries
                .iter()
                .filter(|(k, _)| Self::namespace(k) == namespace)
                .min_by_key(|(_, v)| v.expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
            }
        }

        entries.insert(
            key.to_string(),
            StoredValue {
                payload: value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => {
                Ok(Some(stored.payload.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        self.insert_locked(&mut entries, key, value, ttl);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if let Some(stored) = entries.get(key) {
            if stored.expires_at > Instant::now() {
                return Ok(false);
            }
        }
        self.insert_locked(&mut entries, key, value, ttl);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(key);
        Ok(())
    }
}

// --- Redis store ---

/// Shared store over a Redis connection manager. Used when `REDIS_URL` is
/// configured, so multiple processes share deep-link results and locks.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }
}

// --- Manager ---

/// Typed facade over the store. All errors degrade to a miss with a warning;
/// the pipeline never fails because the cache did.
pub struct CacheManager {
    store: Box<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = match self.store.get_raw(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key, error = %e, "Cache entry failed to decode, dropping");
                let _ = self.store.delete(key).await;
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>, ttl: Duration) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Cache entry failed to encode, skipping write");
                return;
            }
        };
        if let Err(e) = self.store.set_raw(key, raw, ttl).await {
            warn!(key, error = %e, "Cache write failed, continuing without");
        }
    }

    /// Non-blocking SETNX lock. Returns true when this caller now holds it.
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> bool {
        match self.store.set_nx(key, "1".to_string(), ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key, error = %e, "Lock acquisition failed, skipping");
                false
            }
        }
    }

    pub async fn unlock(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "Lock release failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_manager() -> CacheManager {
        CacheManager::new(Box::new(MemoryStore::new(HashMap::new())))
    }

    #[tokio::test]
    async fn round_trip_preserves_entry() {
        let cache = memory_manager();
        let entry = CacheEntry::found("https://wolt.com/r/x".to_string());
        cache
            .put("provider:wolt:p1", &entry, Duration::from_secs(60))
            .await;

        let read: CacheEntry<String> = cache.get("provider:wolt:p1").await.unwrap();
        assert_eq!(read.status, CacheStatus::Found);
        assert_eq!(read.value, "https://wolt.com/r/x");
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = memory_manager();
        let entry = CacheEntry::found(1u32);
        cache.put("geo:tlv", &entry, Duration::from_millis(5)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get::<u32>("geo:tlv").await.is_none());
    }

    #[tokio::test]
    async fn set_nx_is_exclusive_until_expiry() {
        let cache = memory_manager();
        assert!(cache.try_lock("provider:wolt:lock:p1", Duration::from_secs(60)).await);
        assert!(!cache.try_lock("provider:wolt:lock:p1", Duration::from_secs(60)).await);
        cache.unlock("provider:wolt:lock:p1").await;
        assert!(cache.try_lock("provider:wolt:lock:p1", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let cache = memory_manager();
        assert!(cache.try_lock("provider:wolt:lock:p2", Duration::from_millis(5)).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.try_lock("provider:wolt:lock:p2", Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn namespace_capacity_evicts_oldest() {
        let mut caps = HashMap::new();
        caps.insert("geo".to_string(), 2);
        let cache = CacheManager::new(Box::new(MemoryStore::new(caps)));

        cache.put("geo:a", &CacheEntry::found(1u32), Duration::from_secs(10)).await;
        cache.put("geo:b", &CacheEntry::found(2u32), Duration::from_secs(20)).await;
        cache.put("geo:c", &CacheEntry::found(3u32), Duration::from_secs(30)).await;

        // "geo:a" expires soonest and is the eviction victim.
        assert!(cache.get::<u32>("geo:a").await.is_none());
        assert!(cache.get::<u32>("geo:b").await.is_some());
        assert!(cache.get::<u32>("geo:c").await.is_some());
    }

    #[tokio::test]
    async fn capacity_is_per_namespace() {
        let mut caps = HashMap::new();
        caps.insert("geo".to_string(), 1);
        let cache = CacheManager::new(Box::new(MemoryStore::new(caps)));

        cache.put("geo:a", &CacheEntry::found(1u32), Duration::from_secs(10)).await;
        cache.put("places:x", &CacheEntry::found(2u32), Duration::from_secs(10)).await;
        cache.put("places:y", &CacheEntry::found(3u32), Duration::from_secs(10)).await;

        assert!(cache.get::<u32>("geo:a").await.is_some());
        assert!(cache.get::<u32>("places:x").await.is_some());
        assert!(cache.get::<u32>("places:y").await.is_some());
    }

    #[tokio::test]
    async fn undecodable_entry_is_dropped() {
        let store = MemoryStore::new(HashMap::new());
        store
            .set_raw("intent:bad", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let cache = CacheManager::new(Box::new(store));
        assert!(cache.get::<u32>("intent:bad").await.is_none());
    }
}
