//! Small TTL map shared between request tasks.
//!
//! Used for OIDC discovery documents and key sets, which are read on almost
//! every ID token verification and change rarely.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
    last_sweep: Arc<Mutex<Instant>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Drop expired entries at most once per [`SWEEP_INTERVAL`]. Never blocks.
    fn maybe_sweep(&self) {
        if let Ok(mut last) = self.last_sweep.try_lock() {
            if last.elapsed() >= SWEEP_INTERVAL {
                *last = Instant::now();
                drop(last);
                let now = Instant::now();
                self.entries.retain(|_, entry| !entry.is_expired(now));
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.maybe_sweep();
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.maybe_sweep();
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

}
