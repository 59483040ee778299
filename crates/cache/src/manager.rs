//! Namespaced TTL cache with LRU eviction.
//!
//! Namespaces are registered once at startup with a fixed TTL and capacity and
//! never share capacity. Reads treat an expired entry as absent before any
//! sweep gets to it. `get_or_set` coalesces concurrent misses for one key into
//! a single `compute`.

use crate::config::{presets, NamespaceConfig};
use crate::error::{CacheError, GetOrSetError};
use crate::namespace::Namespace;
use crate::stats::{EntrySnapshot, NamespaceStats};
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct CacheManager<V> {
    namespaces: DashMap<String, Arc<Namespace<V>>>,
}

impl<V> Default for CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// A manager with no namespaces.
    pub fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
        }
    }

    /// A manager with the `volatile`, `reference` and `device_status`
    /// namespaces registered.
    pub fn with_presets() -> Self {
        let manager = Self::new();
        for (name, config) in presets::all() {
            manager
                .namespaces
                .insert(name.to_string(), Arc::new(Namespace::new(name, config)));
        }
        manager
    }

    pub fn register_namespace(&self, name: &str, config: NamespaceConfig) -> Result<(), CacheError> {
        if name.trim().is_empty() {
            return Err(CacheError::InvalidConfig(
                "namespace name must not be empty".into(),
            ));
        }
        if config.max_entries == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "namespace `{name}` needs max_entries > 0"
            )));
        }

        match self.namespaces.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CacheError::DuplicateNamespace(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Namespace::new(name, config)));
                tracing::debug!(
                    namespace = name,
                    ttl_ms = config.ttl.as_millis() as u64,
                    max_entries = config.max_entries,
                    "cache namespace registered"
                );
                Ok(())
            }
        }
    }

    pub fn namespace_config(&self, name: &str) -> Option<NamespaceConfig> {
        self.namespaces.get(name).map(|ns| ns.config())
    }

    /// Registered namespace names, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    // Cloned out so no map shard lock is held across an await.
    fn namespace(&self, name: &str) -> Result<Arc<Namespace<V>>, CacheError> {
        self.namespaces
            .get(name)
            .map(|ns| Arc::clone(ns.value()))
            .ok_or_else(|| CacheError::UnknownNamespace(name.to_string()))
    }

    /// Live value for `key`, counting a hit or a miss.
    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.namespace(namespace)?.lookup(key, true))
    }

    /// Store `value`, replacing any previous entry. `ttl` overrides the
    /// namespace default for this entry only.
    pub fn set(
        &self,
        namespace: &str,
        key: &str,
        value: V,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.namespace(namespace)?.insert(key, value, ttl);
        Ok(())
    }

    /// Whether a live entry exists. Does not count as an access.
    pub fn has(&self, namespace: &str, key: &str) -> Result<bool, CacheError> {
        Ok(self.namespace(namespace)?.contains(key))
    }

    /// Remove `key`; true if a live entry was removed.
    pub fn delete(&self, namespace: &str, key: &str) -> Result<bool, CacheError> {
        Ok(self.namespace(namespace)?.remove(key))
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// Concurrent callers for the same key wait for the first one's `compute`
    /// and read its result from the cache. When `compute` fails nothing is
    /// stored, the error goes to that caller, and the next waiter computes.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<V, GetOrSetError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let ns = self.namespace(namespace)?;
        if let Some(value) = ns.lookup(key, false) {
            return Ok(value);
        }

        let flight = ns.join_flight(key);
        let _turn = flight.lock().await;

        // Someone ahead of us may have filled it
        if let Some(value) = ns.lookup(key, false) {
            return Ok(value);
        }

        ns.record_miss();
        match compute().await {
            Ok(value) => {
                ns.insert(key, value.clone(), ttl);
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(namespace, key, "cache compute failed, nothing stored");
                Err(GetOrSetError::Compute(err))
            }
        }
    }

    /// Store several entries under the same TTL. Returns the number stored.
    pub fn set_multiple<I>(
        &self,
        namespace: &str,
        entries: I,
        ttl: Option<Duration>,
    ) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let ns = self.namespace(namespace)?;
        let mut stored = 0;
        for (key, value) in entries {
            ns.insert(&key, value, ttl);
            stored += 1;
        }
        Ok(stored)
    }

    /// Live values for the keys that have one; absent keys are left out.
    pub fn get_multiple<K>(&self, namespace: &str, keys: &[K]) -> Result<HashMap<String, V>, CacheError>
    where
        K: AsRef<str>,
    {
        let ns = self.namespace(namespace)?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                ns.lookup(key, true).map(|value| (key.to_string(), value))
            })
            .collect())
    }

    /// Pre-populate a namespace without clobbering live entries. Returns the
    /// number of entries inserted.
    pub fn warm_up<I>(&self, namespace: &str, entries: I) -> Result<usize, CacheError>
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let ns = self.namespace(namespace)?;
        let inserted = entries
            .into_iter()
            .filter(|(key, value)| ns.insert_absent(key, value.clone(), None))
            .count();
        tracing::info!(namespace, inserted, "cache namespace warmed up");
        Ok(inserted)
    }

    /// Empty one namespace, or all of them. Counters are kept.
    pub fn clear(&self, namespace: Option<&str>) -> Result<(), CacheError> {
        match namespace {
            Some(name) => self.namespace(name)?.clear(),
            None => self.namespaces.iter().for_each(|ns| ns.value().clear()),
        }
        Ok(())
    }

    pub fn keys(&self, namespace: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.namespace(namespace)?.keys())
    }

    /// Stats for one namespace, or every namespace sorted by name.
    pub fn stats(&self, namespace: Option<&str>) -> Result<Vec<NamespaceStats>, CacheError> {
        match namespace {
            Some(name) => Ok(vec![self.namespace(name)?.stats()]),
            None => {
                let mut stats: Vec<NamespaceStats> =
                    self.namespaces.iter().map(|ns| ns.value().stats()).collect();
                stats.sort_by(|a, b| a.namespace.cmp(&b.namespace));
                Ok(stats)
            }
        }
    }

    /// Drop at most `batch_limit` expired entries across all namespaces.
    pub fn sweep_expired(&self, batch_limit: usize) -> usize {
        let targets: Vec<Arc<Namespace<V>>> = self
            .namespaces
            .iter()
            .map(|ns| Arc::clone(ns.value()))
            .collect();

        let mut removed = 0;
        for ns in targets {
            if removed >= batch_limit {
                break;
            }
            removed += ns.sweep(batch_limit - removed);
        }

        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Entry metadata for diagnostics, most recently used first.
    pub fn debug_snapshot(&self, namespace: &str) -> Result<Vec<EntrySnapshot>, CacheError> {
        Ok(self.namespace(namespace)?.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn manager(ttl_ms: u64, max_entries: usize) -> CacheManager<String> {
        let manager = CacheManager::new();
        manager
            .register_namespace(
                "ns",
                NamespaceConfig::new(Duration::from_millis(ttl_ms), max_entries),
            )
            .unwrap();
        manager
    }

    fn value(s: &str) -> String {
        s.to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_within_ttl() {
        let cache = manager(100, 10);
        cache.set("ns", "input.1", value("hdmi"), None).unwrap();
        assert_eq!(cache.get("ns", "input.1").unwrap(), Some(value("hdmi")));

        tokio::time::advance(Duration::from_millis(101)).await;
        assert_eq!(cache.get("ns", "input.1").unwrap(), None);
        assert!(!cache.has("ns", "input.1").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_override_applies_to_one_entry() {
        let cache = manager(100, 10);
        cache
            .set("ns", "long", value("x"), Some(Duration::from_secs(10)))
            .unwrap();
        cache.set("ns", "short", value("y"), None).unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cache.has("ns", "long").unwrap());
        assert!(!cache.has("ns", "short").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_least_recently_accessed() {
        let cache = manager(10_000, 2);
        cache.set("ns", "a", value("1"), None).unwrap();
        cache.set("ns", "b", value("2"), None).unwrap();
        // Touch `a` so `b` becomes least recent
        cache.get("ns", "a").unwrap();
        cache.set("ns", "c", value("3"), None).unwrap();

        assert!(cache.has("ns", "a").unwrap());
        assert!(!cache.has("ns", "b").unwrap());
        assert!(cache.has("ns", "c").unwrap());
        assert_eq!(cache.stats(Some("ns")).unwrap()[0].evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_reclaims_expired_entry_first() {
        let cache = manager(1000, 2);
        cache
            .set("ns", "fresh", value("1"), Some(Duration::from_secs(60)))
            .unwrap();
        cache
            .set("ns", "stale", value("2"), Some(Duration::from_millis(10)))
            .unwrap();
        cache.get("ns", "stale").unwrap();

        tokio::time::advance(Duration::from_millis(20)).await;
        cache.set("ns", "new", value("3"), None).unwrap();

        let stats = &cache.stats(Some("ns")).unwrap()[0];
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
        assert!(cache.has("ns", "fresh").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_does_not_evict() {
        let cache = manager(1000, 2);
        cache.set("ns", "a", value("1"), None).unwrap();
        cache.set("ns", "b", value("2"), None).unwrap();
        cache.set("ns", "a", value("1b"), None).unwrap();

        assert_eq!(cache.get("ns", "a").unwrap(), Some(value("1b")));
        assert!(cache.has("ns", "b").unwrap());
    }

    #[test]
    fn empty_key_is_valid() {
        let cache = manager(1000, 2);
        cache.set("ns", "", value("root"), None).unwrap();
        assert_eq!(cache.get("ns", "").unwrap(), Some(value("root")));
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let cache = manager(1000, 2);
        assert_eq!(
            cache.get("nope", "k").unwrap_err(),
            CacheError::UnknownNamespace("nope".into())
        );
        assert!(cache.set("nope", "k", value("v"), None).is_err());
        assert!(cache.stats(Some("nope")).is_err());
    }

    #[test]
    fn registration_is_validated() {
        let cache: CacheManager<String> = CacheManager::new();
        assert!(matches!(
            cache.register_namespace("empty", NamespaceConfig::new(Duration::from_secs(1), 0)),
            Err(CacheError::InvalidConfig(_))
        ));
        cache
            .register_namespace("ok", NamespaceConfig::new(Duration::from_secs(1), 1))
            .unwrap();
        assert_eq!(
            cache.register_namespace("ok", NamespaceConfig::new(Duration::from_secs(1), 1)),
            Err(CacheError::DuplicateNamespace("ok".into()))
        );
    }

    #[test]
    fn presets_are_registered() {
        let cache: CacheManager<String> = CacheManager::with_presets();
        assert_eq!(
            cache.namespaces(),
            vec!["device_status", "reference", "volatile"]
        );
        assert_eq!(
            cache.namespace_config("device_status"),
            Some(presets::device_status())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn get_or_set_computes_once_under_concurrency() {
        let cache = Arc::new(manager(10_000, 10));
        let computes = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let computes = Arc::clone(&computes);
                tokio::spawn(async move {
                    cache
                        .get_or_set(
                            "ns",
                            "matrix.status",
                            || async move {
                                computes.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(50)).await;
                                Ok::<_, String>(value("online"))
                            },
                            None,
                        )
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "online");
        }
        assert_eq!(computes.load(Ordering::SeqCst), 1);

        let stats = &cache.stats(Some("ns")).unwrap()[0];
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_compute_stores_nothing() {
        let cache = manager(10_000, 10);
        let err = cache
            .get_or_set("ns", "dsp.levels", || async { Err::<String, _>("timeout") }, None)
            .await
            .unwrap_err();
        assert_eq!(err.into_compute(), Some("timeout"));
        assert!(!cache.has("ns", "dsp.levels").unwrap());

        let value = cache
            .get_or_set("ns", "dsp.levels", || async { Ok::<_, &str>(value("-12dB")) }, None)
            .await
            .unwrap();
        assert_eq!(value, "-12dB");
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_recomputes_after_leader_fails() {
        let cache = Arc::new(manager(10_000, 10));
        let attempts = Arc::new(AtomicUsize::new(0));

        let run = |cache: Arc<CacheManager<String>>, attempts: Arc<AtomicUsize>| async move {
            cache
                .get_or_set(
                    "ns",
                    "k",
                    || async move {
                        let n = attempts.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        if n == 0 {
                            Err("first fails")
                        } else {
                            Ok(value("second"))
                        }
                    },
                    None,
                )
                .await
        };

        let leader = tokio::spawn(run(Arc::clone(&cache), Arc::clone(&attempts)));
        let waiter = tokio::spawn(run(Arc::clone(&cache), Arc::clone(&attempts)));

        assert!(leader.await.unwrap().is_err());
        assert_eq!(waiter.await.unwrap().unwrap(), "second");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flight_slot_is_released() {
        let cache = manager(10_000, 10);
        cache
            .get_or_set("ns", "k", || async { Ok::<_, String>(value("v")) }, None)
            .await
            .unwrap();

        let ns = cache.namespace("ns").unwrap();
        assert_eq!(ns.flights(), 0);
    }

    #[test]
    fn bulk_helpers() {
        let cache = manager(10_000, 10);
        let stored = cache
            .set_multiple(
                "ns",
                vec![("a".to_string(), value("1")), ("b".to_string(), value("2"))],
                None,
            )
            .unwrap();
        assert_eq!(stored, 2);

        let found = cache.get_multiple("ns", &["a", "b", "missing"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], "2");

        let inserted = cache
            .warm_up(
                "ns",
                vec![("a".to_string(), value("other")), ("c".to_string(), value("3"))],
            )
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(cache.get("ns", "a").unwrap(), Some(value("1")));
        assert_eq!(cache.keys("ns").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn clear_and_delete() {
        let cache: CacheManager<String> = CacheManager::with_presets();
        cache.set("volatile", "score", value("3-1"), None).unwrap();
        cache.set("reference", "channel.5", value("ESPN"), None).unwrap();

        assert!(cache.delete("volatile", "score").unwrap());
        assert!(!cache.delete("volatile", "score").unwrap());

        cache.clear(Some("reference")).unwrap();
        assert!(cache.keys("reference").unwrap().is_empty());

        cache.set("device_status", "tv.1", value("on"), None).unwrap();
        cache.clear(None).unwrap();
        assert!(cache.keys("device_status").unwrap().is_empty());
        assert!(cache.clear(Some("nope")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_track_hit_rate() {
        let cache = manager(10_000, 10);
        cache.set("ns", "a", value("1"), None).unwrap();
        cache.get("ns", "a").unwrap();
        cache.get("ns", "a").unwrap();
        cache.get("ns", "a").unwrap();
        cache.get("ns", "b").unwrap();
        cache.has("ns", "a").unwrap();

        let stats = &cache.stats(None).unwrap()[0];
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.75);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 10);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["ttl"], 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_is_bounded() {
        let cache = manager(10, 100);
        for i in 0..10 {
            cache.set("ns", &format!("k{i}"), value("v"), None).unwrap();
        }
        tokio::time::advance(Duration::from_millis(20)).await;

        assert_eq!(cache.sweep_expired(4), 4);
        assert_eq!(cache.sweep_expired(100), 6);
        assert_eq!(cache.sweep_expired(100), 0);
        assert_eq!(cache.stats(Some("ns")).unwrap()[0].expirations, 10);
    }

    #[derive(Debug)]
    struct Node {
        next: Mutex<Option<Arc<Node>>>,
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_handles_cyclic_values() {
        let cache: CacheManager<Arc<Node>> = CacheManager::new();
        cache
            .register_namespace("graph", NamespaceConfig::new(Duration::from_secs(1), 4))
            .unwrap();

        let a = Arc::new(Node {
            next: Mutex::new(None),
        });
        let b = Arc::new(Node {
            next: Mutex::new(Some(Arc::clone(&a))),
        });
        *a.next.lock().unwrap() = Some(Arc::clone(&b));
        cache.set("graph", "a", a, None).unwrap();
        cache.get("graph", "a").unwrap();

        tokio::time::advance(Duration::from_millis(300)).await;
        let snapshot = cache.debug_snapshot("graph").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].key, "a");
        assert_eq!(snapshot[0].hit_count, 1);
        assert_eq!(snapshot[0].ttl_remaining, Duration::from_millis(700));
        assert!(serde_json::to_string(&snapshot).is_ok());
    }
}
