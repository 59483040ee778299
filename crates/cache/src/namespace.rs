use crate::config::NamespaceConfig;
use crate::stats::{EntrySnapshot, NamespaceStats};
use lru::LruCache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    last_accessed: Instant,
    hit_count: u64,
}

impl<V> Entry<V> {
    fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.checked_add(ttl).unwrap_or_else(|| far_future(now)),
            last_accessed: now,
            hit_count: 0,
        }
    }

    /// Logically absent once `now` is past `expires_at`.
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}

#[derive(Debug)]
struct FlightSlot {
    gate: Arc<tokio::sync::Mutex<()>>,
    participants: usize,
}

/// One namespace: entries in LRU order plus counters.
///
/// `LruCache` keeps recency order; `get` promotes, `peek` does not.
#[derive(Debug)]
pub(crate) struct Namespace<V> {
    name: String,
    config: NamespaceConfig,
    entries: Mutex<LruCache<String, Entry<V>>>,
    in_flight: Mutex<HashMap<String, FlightSlot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> Namespace<V> {
    /// `config.max_entries` must already be validated as non-zero.
    pub(crate) fn new(name: &str, config: NamespaceConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            entries: Mutex::new(LruCache::unbounded()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub(crate) fn config(&self) -> NamespaceConfig {
        self.config
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, Entry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop `key` if it has expired. Returns true when it was dropped.
    fn expire_if_stale(&self, entries: &mut LruCache<String, Entry<V>>, key: &str, now: Instant) -> bool {
        let expired = entries.peek(key).is_some_and(|entry| entry.is_expired(now));
        if expired {
            entries.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        expired
    }

    /// Read a live entry, marking it as accessed. Hits are always counted;
    /// misses only when `count_miss` is set.
    pub(crate) fn lookup(&self, key: &str, count_miss: bool) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries();
        self.expire_if_stale(&mut entries, key, now);

        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed = now;
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                if count_miss {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
        }
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Presence check that leaves recency and hit counts alone.
    pub(crate) fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        self.expire_if_stale(&mut entries, key, now);
        entries.contains(key)
    }

    pub(crate) fn insert(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.config.ttl);
        let mut entries = self.entries();

        if !entries.contains(key) && entries.len() >= self.config.max_entries {
            self.make_room(&mut entries, now);
        }
        entries.put(key.to_string(), Entry::new(value, now, ttl));
    }

    /// Insert only when no live entry exists. Returns true if inserted.
    pub(crate) fn insert_absent(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        self.expire_if_stale(&mut entries, key, now);
        if entries.contains(key) {
            return false;
        }

        if entries.len() >= self.config.max_entries {
            self.make_room(&mut entries, now);
        }
        let ttl = ttl.unwrap_or(self.config.ttl);
        entries.put(key.to_string(), Entry::new(value, now, ttl));
        true
    }

    /// Free one slot: an expired entry if there is one, else the LRU entry.
    fn make_room(&self, entries: &mut LruCache<String, Entry<V>>, now: Instant) {
        let expired = entries
            .iter()
            .rev()
            .find(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone());

        if let Some(key) = expired {
            entries.pop(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return;
        }

        if let Some((key, _)) = entries.pop_lru() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(namespace = %self.name, key = %key, "evicted least recently used entry");
        }
    }

    /// Remove `key`. True if a live entry was removed.
    pub(crate) fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries()
            .pop(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    pub(crate) fn clear(&self) {
        self.entries().clear();
    }

    /// Live keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Physically drop up to `limit` expired entries.
    pub(crate) fn sweep(&self, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        let now = Instant::now();
        let mut entries = self.entries();
        let expired: Vec<String> = entries
            .iter()
            .rev()
            .filter(|(_, entry)| entry.is_expired(now))
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    pub(crate) fn stats(&self) -> NamespaceStats {
        let now = Instant::now();
        let size = self
            .entries()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        NamespaceStats {
            namespace: self.name.clone(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            size,
            capacity: self.config.max_entries,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            ttl: self.config.ttl,
        }
    }

    /// Entry metadata in recency order (most recent first). Values are never
    /// read, so any value shape is safe to report.
    pub(crate) fn snapshot(&self) -> Vec<EntrySnapshot> {
        let now = Instant::now();
        self.entries()
            .iter()
            .map(|(key, entry)| EntrySnapshot {
                key: key.clone(),
                age: now.saturating_duration_since(entry.created_at),
                idle: now.saturating_duration_since(entry.last_accessed),
                ttl_remaining: entry.expires_at.saturating_duration_since(now),
                hit_count: entry.hit_count,
                expired: entry.is_expired(now),
            })
            .collect()
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, FlightSlot>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Join (or open) the in-flight slot for `key`.
    ///
    /// Registration is synchronous, so every caller that misses before the
    /// first `.await` lands on the same gate.
    pub(crate) fn join_flight(&self, key: &str) -> Flight<'_, V> {
        let mut in_flight = self.in_flight();
        let slot = in_flight
            .entry(key.to_string())
            .or_insert_with(|| FlightSlot {
                gate: Arc::new(tokio::sync::Mutex::new(())),
                participants: 0,
            });
        slot.participants += 1;
        Flight {
            namespace: self,
            key: key.to_string(),
            gate: Arc::clone(&slot.gate),
        }
    }

    #[cfg(test)]
    pub(crate) fn flights(&self) -> usize {
        self.in_flight().len()
    }
}

/// A caller's stake in an in-flight computation. The slot is dropped from the
/// map when its last participant leaves, cancelled futures included.
pub(crate) struct Flight<'a, V> {
    namespace: &'a Namespace<V>,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<V> Flight<'_, V> {
    pub(crate) async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl<V> Drop for Flight<'_, V> {
    fn drop(&mut self) {
        let mut in_flight = self
            .namespace
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let last = match in_flight.get_mut(&self.key) {
            Some(slot) => {
                slot.participants = slot.participants.saturating_sub(1);
                slot.participants == 0
            }
            None => false,
        };
        if last {
            in_flight.remove(&self.key);
        }
    }
}
