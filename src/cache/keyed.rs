//! Single-flight keyed cache.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::store::{Flight, Probe, Store};
use crate::cache::{CacheConfig, CacheStats, FlightAborted, hit_rate};

/// A TTL + LRU cache that coalesces concurrent fetches for the same key.
///
/// The handle is cheap to clone; clones share the same entries and counters.
///
/// The structural lock is only held for map and list operations, never while
/// a fetch runs, so a slow fetch for one key does not block lookups of others.
/// Fetches run on their own task: a caller that stops waiting does not cancel
/// the fetch, and its result is still cached for later callers.
pub struct KeyedCache<V, E> {
    shared: Arc<Shared<V, E>>,
}

struct Shared<V, E> {
    store: Mutex<Store<V, E>>,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced: AtomicU64,
}

enum Role<V, E> {
    Hit(V),
    Leader(watch::Sender<Option<Result<V, E>>>, Flight<V, E>),
    Follower(Flight<V, E>),
}

impl<V, E> KeyedCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + From<FlightAborted> + Send + Sync + 'static,
{
    /// Create a new cache from configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_ttl(config.ttl, config.max_size)
    }

    /// Create a new cache with the given entry lifetime and capacity.
    pub fn with_ttl(ttl: Duration, max_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(Store::new(ttl, max_size)),
                ttl,
                max_size,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached value for `key`, fetching it if there is no live entry.
    ///
    /// `fetch` is only called when this caller is the first to miss on `key`.
    /// Callers arriving while that fetch runs wait for it and receive a clone
    /// of its result. Errors are handed to every waiter and never cached.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn get_or_set<F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let role = {
            let mut store = self.shared.lock();
            match store.probe(key, Instant::now()) {
                Probe::Hit(value) => Role::Hit(value),
                Probe::Expired | Probe::Absent => match store.inflight.get(key) {
                    Some(flight) => Role::Follower(flight.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        store.inflight.insert(key.to_owned(), rx.clone());
                        Role::Leader(tx, rx)
                    }
                },
            }
        };

        let flight = match role {
            Role::Hit(value) => {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "cache hit");
                return Ok(value);
            }
            Role::Follower(flight) => {
                self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "joining in-flight fetch");
                flight
            }
            Role::Leader(tx, flight) => {
                tracing::debug!(key, "cache miss, fetching");
                // Armed before `fetch` runs so a panicking closure still clears the marker.
                let guard = FlightGuard {
                    shared: Arc::clone(&self.shared),
                    key: key.to_owned(),
                    completed: false,
                };
                let fut = fetch(key.to_owned());
                Self::launch(guard, tx, fut);
                flight
            }
        };

        Self::wait(flight).await
    }

    fn launch<Fut>(
        mut guard: FlightGuard<V, E>,
        tx: watch::Sender<Option<Result<V, E>>>,
        fut: Fut,
    ) where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        tokio::spawn(async move {
            let result = fut.await;
            guard.shared.complete(&guard.key, &result);
            guard.completed = true;
            tx.send_replace(Some(result));
        });
    }

    async fn wait(mut flight: Flight<V, E>) -> Result<V, E> {
        let outcome = match flight.wait_for(Option::is_some).await {
            Ok(result) => result.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(E::from(FlightAborted)))
    }

    /// Remove expired entries now.
    ///
    /// Only affects memory held by stale values: an expired entry is never
    /// served, whether or not it has been swept.
    pub fn purge_expired(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Spawn a background task that purges expired entries every `every`.
    ///
    /// The task stops by itself once every handle to the cache is dropped.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let period = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let purged = shared.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "swept expired cache entries");
                }
            }
        })
    }
}

impl<V, E> KeyedCache<V, E> {
    /// Current statistics, read from the live counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.shared.hits.load(Ordering::Relaxed);
        let misses = self.shared.misses.load(Ordering::Relaxed);

        CacheStats {
            size: self.len(),
            max_size: self.shared.max_size,
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
            coalesced: self.shared.coalesced.load(Ordering::Relaxed),
            ttl: self.shared.ttl,
        }
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored entry. Counters and in-flight fetches are untouched.
    pub fn clear(&self) {
        self.shared.lock().clear();
    }

    /// Configured entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.shared.max_size
    }
}

impl<V, E> Shared<V, E> {
    fn lock(&self) -> MutexGuard<'_, Store<V, E>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }
}

impl<V: Clone, E> Shared<V, E> {
    /// Publish a finished fetch: store the value on success and clear the
    /// in-flight marker, both under the structural lock.
    fn complete(&self, key: &str, result: &Result<V, E>) {
        let mut store = self.lock();
        store.inflight.remove(key);

        if let Ok(value) = result {
            let evicted = store.insert(key.to_owned(), value.clone(), Instant::now());
            self.misses.fetch_add(1, Ordering::Relaxed);
            if evicted > 0 {
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            }
        } else {
            tracing::debug!(key, "fetch failed, nothing cached");
        }
    }
}

impl<V, E> Clone for KeyedCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V, E> std::fmt::Debug for KeyedCache<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedCache")
            .field("ttl", &self.shared.ttl)
            .field("max_size", &self.shared.max_size)
            .finish()
    }
}

/// Clears the in-flight marker if the fetch task dies before completing.
///
/// Dropping the task also drops the sender, which wakes waiters with
/// [`FlightAborted`].
struct FlightGuard<V, E> {
    shared: Arc<Shared<V, E>>,
    key: String,
    completed: bool,
}

impl<V, E> Drop for FlightGuard<V, E> {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(key = %self.key, "in-flight fetch aborted");
            self.shared.lock().inflight.remove(&self.key);
        }
    }
}
