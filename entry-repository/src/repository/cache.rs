//! Per-entry-type value cache
//!
//! Read-through memoization keyed by an arbitrary string and scoped to one
//! entry type. Values are stored as JSON so any `Serialize +
//! DeserializeOwned` type can be cached. Entries either expire after a TTL or
//! live until flushed; the repository flushes its scope after every write.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;

/// Backing maps, shareable between repositories
///
/// Besides the values, each scope carries a generation that `flush` bumps,
/// so a value computed before a flush is never stored after it.
#[derive(Debug, Default)]
pub struct CacheStore {
    values: DashMap<String, CachedValue>,
    generations: DashMap<String, u64>,
}

impl CacheStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

/// One cached value
#[derive(Debug, Clone)]
pub struct CachedValue {
    value: Value,
    expires_at: Option<Instant>,
}

impl CachedValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Cache scoped to one entry type
#[derive(Debug, Clone)]
pub struct EntryCache {
    scope: String,
    enabled: bool,
    store: Arc<CacheStore>,
}

impl EntryCache {
    /// Create a cache with its own store
    pub fn new(scope: impl Into<String>) -> Self {
        Self::with_store(scope, Arc::new(CacheStore::new()))
    }

    /// Create a cache over a shared store
    pub fn with_store(scope: impl Into<String>, store: Arc<CacheStore>) -> Self {
        Self {
            scope: scope.into(),
            enabled: true,
            store,
        }
    }

    /// The same store under another scope
    #[must_use]
    pub fn rescoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            enabled: self.enabled,
            store: Arc::clone(&self.store),
        }
    }

    /// Enable or disable caching; a disabled cache always recomputes
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether caching is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The entry type this cache is scoped to
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}::{}", self.scope, key)
    }

    fn prefix(&self) -> String {
        format!("{}::", self.scope)
    }

    fn generation(&self) -> u64 {
        *self.store.generations.entry(self.scope.clone()).or_insert(0)
    }

    fn encode<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> RepositoryResult<CachedValue> {
        let value = serde_json::to_value(value).map_err(|e| {
            RepositoryError::serialization_error(
                RepositoryOperation::Cache,
                format!("value for '{}' does not encode: {}", key, e),
            )
        })?;
        // A TTL past the clock's range never expires
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        Ok(CachedValue { value, expires_at })
    }

    /// Cached value for `key`, if present and not expired
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the cached JSON does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> RepositoryResult<Option<T>> {
        if !self.enabled {
            return Ok(None);
        }
        let scoped = self.scoped_key(key);
        let cached = self.store.values.get(&scoped).map(|entry| entry.value().clone());
        match cached {
            Some(cached) if cached.is_expired(Instant::now()) => {
                self.store.values.remove(&scoped);
                Ok(None)
            }
            Some(cached) => serde_json::from_value(cached.value).map(Some).map_err(|e| {
                RepositoryError::serialization_error(
                    RepositoryOperation::Cache,
                    format!("cached value for '{}' does not decode: {}", key, e),
                )
            }),
            None => Ok(None),
        }
    }

    /// Store a value; `None` TTL keeps it until flushed
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `value` cannot be encoded as JSON.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> RepositoryResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let cached = self.encode(key, value, ttl)?;
        self.store.values.insert(self.scoped_key(key), cached);
        Ok(())
    }

    /// Store a value only if the scope has not been flushed since `generation`
    fn put_unless_flushed<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        generation: u64,
    ) -> RepositoryResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let cached = self.encode(key, value, ttl)?;
        // Holding the generation entry keeps a concurrent flush out until the insert is done
        let current = self.store.generations.get(&self.scope);
        if current.as_deref().copied().unwrap_or(0) != generation {
            return Ok(false);
        }
        self.store.values.insert(self.scoped_key(key), cached);
        Ok(true)
    }

    /// Return the cached value, or compute, store and return it
    ///
    /// The lock on the store is never held while `compute` runs. If the scope
    /// is flushed while `compute` runs, the value is returned but not stored.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> RepositoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepositoryResult<T>>,
    {
        if let Some(hit) = self.get::<T>(key)? {
            tracing::trace!(scope = %self.scope, key, "Entry cache hit");
            return Ok(hit);
        }
        tracing::trace!(scope = %self.scope, key, "Entry cache miss");
        let generation = self.generation();
        let value = compute().await?;
        if !self.put_unless_flushed(key, &value, ttl, generation)? && self.enabled {
            tracing::trace!(scope = %self.scope, key, "Scope flushed during compute, not storing");
        }
        Ok(value)
    }

    /// Drop one key; returns whether it was present
    pub fn forget(&self, key: &str) -> bool {
        self.store.values.remove(&self.scoped_key(key)).is_some()
    }

    /// Drop every key in this scope
    pub fn flush(&self) {
        let prefix = self.prefix();
        let mut generation = self.store.generations.entry(self.scope.clone()).or_insert(0);
        *generation += 1;
        self.store.values.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Number of live keys in this scope
    pub fn len(&self) -> usize {
        let prefix = self.prefix();
        let now = Instant::now();
        self.store
            .values
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix) && !entry.value().is_expired(now))
            .count()
    }

    /// Whether this scope holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_remember_computes_once() {
        let cache = EntryCache::new("posts");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: u64 = cache
                .remember("total", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_recomputes() {
        let cache = EntryCache::new("posts");
        cache.put("k", &"old", Some(Duration::from_secs(10))).unwrap();
        assert_eq!(cache.get::<String>("k").unwrap(), Some("old".to_string()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get::<String>("k").unwrap(), None);

        let value: String = cache
            .remember("k", None, || async { Ok("new".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "new");
    }

    #[tokio::test]
    async fn test_compute_errors_are_not_cached() {
        let cache = EntryCache::new("posts");
        let result: RepositoryResult<u8> = cache
            .remember("k", None, || async {
                Err(RepositoryError::storage_error(RepositoryOperation::Count, "down"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_scopes_are_isolated_on_a_shared_store() {
        let store = Arc::new(CacheStore::new());
        let posts = EntryCache::with_store("posts", store.clone());
        let pages = EntryCache::with_store("pages", store);

        posts.put("count", &1, None).unwrap();
        pages.put("count", &2, None).unwrap();
        assert_eq!(posts.get::<i32>("count").unwrap(), Some(1));

        posts.flush();
        assert_eq!(posts.get::<i32>("count").unwrap(), None);
        assert_eq!(pages.get::<i32>("count").unwrap(), Some(2));
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = EntryCache::new("posts").enabled(false);
        cache.put("k", &1, None).unwrap();
        assert_eq!(cache.get::<i32>("k").unwrap(), None);
    }

    #[test]
    fn test_decode_mismatch_is_serialization_error() {
        let cache = EntryCache::new("posts");
        cache.put("k", &"text", None).unwrap();
        let error = cache.get::<u32>("k").unwrap_err();
        assert_eq!(
            error.kind,
            crate::repository::RepositoryErrorKind::SerializationError
        );
    }

    #[tokio::test]
    async fn test_flush_during_compute_discards_value() {
        let cache = EntryCache::new("posts");
        let value: u32 = cache
            .remember("count", None, || async {
                cache.flush();
                Ok(0)
            })
            .await
            .unwrap();
        assert_eq!(value, 0);
        assert_eq!(cache.get::<u32>("count").unwrap(), None);

        let value: u32 = cache.remember("count", None, || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(cache.get::<u32>("count").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_flush_of_other_scope_keeps_value() {
        let store = Arc::new(CacheStore::new());
        let posts = EntryCache::with_store("posts", store.clone());
        let pages = EntryCache::with_store("pages", store);

        let _: u32 = posts
            .remember("count", None, || async {
                pages.flush();
                Ok(3)
            })
            .await
            .unwrap();
        assert_eq!(posts.get::<u32>("count").unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = EntryCache::new("posts");
        cache.put("k", &1, Some(Duration::MAX)).unwrap();

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get::<i32>("k").unwrap(), Some(1));
    }

    #[test]
    fn test_forget() {
        let cache = EntryCache::new("posts");
        cache.put("k", &1, None).unwrap();
        assert!(cache.forget("k"));
        assert!(!cache.forget("k"));
    }
}
