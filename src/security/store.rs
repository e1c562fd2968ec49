//! Time-stamped record store shared by the guards.
//!
//! # Design Decisions
//! - Backed by `DashMap`: every per-key read-modify-write runs under that
//!   key's shard lock, so two requests for one key never interleave
//! - Sweeping uses `retain`, which locks one shard at a time and never
//!   stops the whole map
//! - Expiry is decided by the caller at sweep time; the store only keeps
//!   records and counts what it evicts

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A concurrent map of string keys to time-stamped records.
#[derive(Debug)]
pub struct ExpiringStore<V> {
    name: &'static str,
    inner: DashMap<String, V>,
}

impl<V: Clone> ExpiringStore<V> {
    /// Create an empty store. `name` labels log lines and metrics.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the record under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.remove(key).map(|(_, v)| v)
    }

    /// Run `f` on the record under `key`, creating it with `init` first if
    /// absent. The whole call is atomic with respect to other writers of
    /// the same key.
    pub fn update<R>(
        &self,
        key: impl Into<String>,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut record = self.inner.entry(key.into()).or_insert_with(init);
        f(record.value_mut())
    }

    /// Raw entry access for callers that need to remove under the lock.
    pub fn entry(&self, key: impl Into<String>) -> Entry<'_, String, V> {
        self.inner.entry(key.into())
    }

    /// Remove every record for which `is_expired(key, record)` holds.
    /// Returns the number of evicted records.
    pub fn sweep(&self, mut is_expired: impl FnMut(&str, &V) -> bool) -> usize {
        let mut evicted = 0;
        self.inner.retain(|k, v| {
            if is_expired(k.as_str(), v) {
                evicted += 1;
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Count records matching `pred`.
    pub fn count_where(&self, mut pred: impl FnMut(&V) -> bool) -> usize {
        self.inner.iter().filter(|r| pred(r.value())).count()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
