//! In-process content cache
//!
//! A TTL key/value store with prefix invalidation and single-flight population.
//! Providers share one [`ContentCache`] through an `Arc`; every key a provider writes
//! starts with `"{provider_id}:"` so all of its state can be dropped at once.

mod directory;

pub use directory::DirectoryCacheManager;

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CacheConfig;

/// A stored value and its absolute expiry
struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub factory_runs: u64,
    pub entries: usize,
}

/// Generic TTL cache shared by providers and decorators
pub struct ContentCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Side index of stored keys, used for prefix removal
    keys: Mutex<BTreeSet<String>>,
    /// Per-key population locks
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    factory_runs: AtomicU64,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            keys: Mutex::new(BTreeSet::new()),
            locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            factory_runs: AtomicU64::new(0),
        }
    }

    /// Create a cache behind an `Arc`, ready to hand to providers
    pub fn shared(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Keys are trimmed and lowercased before every operation
    pub fn normalize_key(key: &str) -> String {
        key.trim().to_lowercase()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl()
    }

    /// Look up a value; expired entries and type mismatches are misses
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return None;
        }
        let found = self.lookup(&Self::normalize_key(key));
        if found.is_none() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Find a live value under a normalized key, counting hits only
    fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    return match entry.value.downcast_ref::<T>() {
                        Some(value) => {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            Some(value.clone())
                        }
                        None => {
                            tracing::debug!("Cache entry {} holds a different type", key);
                            None
                        }
                    };
                }
                Some(_) => true,
            }
        };

        if expired {
            self.remove_normalized(key);
        }
        None
    }

    /// Store a value for `ttl` (or the configured default) from now
    pub fn set<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Send + Sync + 'static,
    {
        if !self.config.enabled {
            return;
        }
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        if ttl.is_zero() {
            return;
        }
        let key = Self::normalize_key(key);
        let now = Instant::now();

        let mut entries = self.entries.write();
        if self.config.set_size_limit
            && !entries.contains_key(&key)
            && entries.len() >= self.config.size_limit
        {
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            let mut keys = self.keys.lock();
            for k in &expired {
                entries.remove(k);
                keys.remove(k);
            }
            if entries.len() >= self.config.size_limit {
                tracing::debug!("Cache full ({} entries), not storing {}", entries.len(), key);
                return;
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                value: Arc::new(value),
                expires_at: now + ttl,
            },
        );
        self.keys.lock().insert(key);
    }

    /// Return the cached value or populate it with `factory`
    ///
    /// At most one factory runs per key at a time: concurrent callers wait on a
    /// per-key lock and re-check the cache once they hold it. `Ok(None)` and errors
    /// from the factory are returned as-is and never stored. With caching disabled
    /// the factory runs on every call.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<Option<T>, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if !self.config.enabled {
            self.factory_runs.fetch_add(1, Ordering::Relaxed);
            return factory().await;
        }

        let key = Self::normalize_key(key);
        if let Some(value) = self.lookup::<T>(&key) {
            tracing::debug!("Cache hit: {}", key);
            return Ok(Some(value));
        }

        // Declared before the guard so the mutex is unlocked before the slot is released
        let slot = self.key_lock(&key);
        let _guard = slot.lock.lock().await;
        if let Some(value) = self.lookup::<T>(&key) {
            tracing::debug!("Cache hit after wait: {}", key);
            return Ok(Some(value));
        }

        tracing::debug!("Cache miss: {}", key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.factory_runs.fetch_add(1, Ordering::Relaxed);
        let created = factory().await;
        if let Ok(Some(value)) = &created {
            self.set(&key, value.clone(), ttl);
        }
        created
    }

    pub fn remove(&self, key: &str) {
        self.remove_normalized(&Self::normalize_key(key));
    }

    /// Remove every entry whose key starts with `prefix`; returns how many were removed
    pub fn remove_by_prefix(&self, prefix: &str) -> usize {
        let prefix = Self::normalize_key(prefix);
        let mut entries = self.entries.write();
        let mut keys = self.keys.lock();

        let matching: Vec<String> = keys
            .range(prefix.clone()..)
            .take_while(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &matching {
            entries.remove(key);
            keys.remove(key);
        }
        tracing::debug!("Removed {} cache entries with prefix '{}'", matching.len(), prefix);
        matching.len()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let mut keys = self.keys.lock();
        entries.clear();
        keys.clear();
        tracing::debug!("Cache cleared");
    }

    /// Number of stored entries, expired ones included until they are touched
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let prefix = Self::normalize_key(prefix);
        self.keys
            .lock()
            .range(prefix.clone()..)
            .take_while(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            factory_runs: self.factory_runs.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    fn remove_normalized(&self, key: &str) {
        let mut entries = self.entries.write();
        let mut keys = self.keys.lock();
        entries.remove(key);
        keys.remove(key);
    }

    fn key_lock(&self, key: &str) -> KeyLock<'_> {
        let lock = self
            .locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        KeyLock {
            cache: self,
            key: key.to_string(),
            lock,
        }
    }
}

/// A caller's handle on a per-key population lock
///
/// Dropping it, on return or when the caller's future is dropped, removes the map
/// entry once no other caller holds the same lock.
struct KeyLock<'a> {
    cache: &'a ContentCache,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.cache.locks.lock();
        // Held by the map and this handle only
        if locks
            .get(&self.key)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2)
        {
            locks.remove(&self.key);
        }
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("enabled", &self.config.enabled)
            .field("entries", &self.len())
            .finish()
    }
}
