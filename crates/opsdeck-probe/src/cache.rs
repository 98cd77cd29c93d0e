//! Per-key TTL cache for probe results.
//!
//! Keys come from a small fixed vocabulary (probe name + target), so
//! entries are only ever overwritten, never evicted.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

type Entry = (Instant, Arc<dyn Any + Send + Sync>);

#[derive(Default)]
pub struct ProbeCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key` if younger than `ttl`, otherwise
    /// run `fetch`, store and return its result.
    ///
    /// Concurrent misses on the same key may both fetch; the last writer wins.
    pub async fn get_or_refresh<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.lookup::<T>(key, ttl) {
            trace!(key, "probe cache hit");
            return hit;
        }
        let value = fetch().await;
        self.store(key, value.clone());
        value
    }

    fn lookup<T: Clone + 'static>(&self, key: &str, ttl: Duration) -> Option<T> {
        let entries = self.entries.lock().ok()?;
        let (ts, value) = entries.get(key)?;
        if ts.elapsed() >= ttl {
            return None;
        }
        value.downcast_ref::<T>().cloned()
    }

    fn store<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (Instant::now(), Arc::new(value)));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
