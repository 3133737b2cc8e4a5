use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::entry::CacheEntry;
use crate::clock::with_timeout;
use crate::error::Result;

/// Default time-to-live for cached statistics.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default upper bound on a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Skip the freshness check and fetch even if the entry is fresh
    pub force_refresh: bool,
}

impl GetOptions {
    pub fn force() -> Self {
        Self { force_refresh: true }
    }
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,
    in_flight: Option<SharedFetch<V>>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

struct Table<K, V> {
    slots: HashMap<K, Slot<V>>,
    /// Bumped by `clear_all` so fetches started earlier cannot repopulate
    generation: u64,
    ttl: Duration,
}

enum Lookup<V> {
    Hit(V),
    Join(SharedFetch<V>),
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Display,
    V: Clone,
{
    /// A fresh value or an in-flight fetch for `key`, if either exists
    fn lookup(&self, key: &K, options: GetOptions) -> Option<Lookup<V>> {
        let slot = self.slots.get(key)?;
        if !options.force_refresh {
            if let Some(entry) = slot.entry.as_ref().filter(|e| e.is_fresh(self.ttl)) {
                trace!(key = %key, "Cache hit");
                return Some(Lookup::Hit(entry.value.clone()));
            }
        }
        slot.in_flight.clone().map(|pending| {
            debug!(key = %key, "Joining in-flight fetch");
            Lookup::Join(pending)
        })
    }
}

struct Inner<K, V> {
    table: Mutex<Table<K, V>>,
    fetch_timeout: Duration,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Display,
    V: Clone,
{
    fn complete(&self, key: &K, generation: u64, result: &Result<V>) {
        let mut table = self.table.lock();
        if table.generation != generation {
            debug!(key = %key, "Cache cleared during fetch, not storing result");
            return;
        }
        let Some(slot) = table.slots.get_mut(key) else {
            return;
        };
        slot.in_flight = None;
        match result {
            Ok(value) => {
                debug!(key = %key, "Cached fresh value");
                slot.entry = Some(CacheEntry::new(value.clone()));
            }
            Err(e) => debug!(key = %key, error = %e, "Fetch failed, cache unchanged"),
        }
    }
}

/// TTL cache in front of remote statistics calls.
///
/// At most one fetch per key is in flight at a time; concurrent callers for
/// a stale key share its outcome. Cheap to clone; clones share entries.
pub struct StatsCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for StatsCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for StatsCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> StatsCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_fetch_timeout(ttl, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_fetch_timeout(ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table {
                    slots: HashMap::new(),
                    generation: 0,
                    ttl,
                }),
                fetch_timeout,
            }),
        }
    }

    /// Return the cached value for `key` if fresh, otherwise run `fetcher`
    /// and cache its result.
    ///
    /// Fetcher errors propagate unchanged and leave the cache as it was.
    pub async fn get<F, Fut>(&self, key: K, fetcher: F, options: GetOptions) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let found = self.inner.table.lock().lookup(&key, options);
        match found {
            Some(Lookup::Hit(value)) => return Ok(value),
            Some(Lookup::Join(pending)) => return pending.await,
            None => {}
        }

        debug!(key = %key, forced = options.force_refresh, "Cache miss, fetching");
        // Runs unlocked: the fetcher may read this cache
        let fetch = fetcher();

        let pending = {
            let mut table = self.inner.table.lock();
            match table.lookup(&key, options) {
                Some(Lookup::Hit(value)) => return Ok(value),
                Some(Lookup::Join(pending)) => pending,
                None => {
                    let generation = table.generation;
                    let weak: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
                    let limit = self.inner.fetch_timeout;
                    let fetch_key = key.clone();
                    let pending = async move {
                        let result = with_timeout(limit, fetch).await;
                        if let Some(inner) = weak.upgrade() {
                            inner.complete(&fetch_key, generation, &result);
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    table.slots.entry(key).or_default().in_flight = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Fresh cached value, without fetching
    pub fn peek(&self, key: &K) -> Option<V> {
        let table = self.inner.table.lock();
        let ttl = table.ttl;
        table
            .slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref())
            .filter(|entry| entry.is_fresh(ttl))
            .map(|entry| entry.value.clone())
    }

    /// Time since `key` was last fetched, fresh or not
    pub fn age(&self, key: &K) -> Option<Duration> {
        let table = self.inner.table.lock();
        table
            .slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref())
            .map(CacheEntry::age)
    }

    pub fn age_display(&self, key: &K) -> Option<String> {
        let table = self.inner.table.lock();
        table
            .slots
            .get(key)
            .and_then(|slot| slot.entry.as_ref())
            .map(CacheEntry::age_display)
    }

    pub fn ttl(&self) -> Duration {
        self.inner.table.lock().ttl
    }

    /// Change the TTL used by every later freshness check.
    pub fn set_ttl(&self, ttl: Duration) {
        self.inner.table.lock().ttl = ttl;
        debug!(ttl_ms = ttl.as_millis() as u64, "Cache TTL changed");
    }

    /// Drop every entry. Fetches already running still answer their callers
    /// but do not repopulate the cache.
    pub fn clear_all(&self) {
        let mut table = self.inner.table.lock();
        table.slots.clear();
        table.generation += 1;
        debug!("Cache cleared");
    }

    /// Number of keys holding a value
    pub fn len(&self) -> usize {
        self.inner
            .table
            .lock()
            .slots
            .values()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
