//! Memoised analysis results keyed by request parameters.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Deterministic identity of an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub analysis: String,
    /// Selected parameter groups, sorted; empty means all groups.
    pub groups: Vec<String>,
    pub remove_outliers: bool,
    /// `f64::to_bits` of the clipping threshold; 0 when clipping is off.
    pub sigma_bits: u64,
}

impl CacheKey {
    pub fn new(analysis: &str, groups: Option<&[String]>, remove_outliers: bool, sigma: f64) -> Self {
        let mut groups: Vec<String> = groups.map(<[String]>::to_vec).unwrap_or_default();
        groups.sort();
        groups.dedup();
        Self {
            analysis: analysis.to_string(),
            groups,
            remove_outliers,
            sigma_bits: if remove_outliers { sigma.to_bits() } else { 0 },
        }
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Keyed result store with manual invalidation and an optional time-to-live.
pub struct DatasetCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Option<Duration>,
}

impl<V: Clone> DatasetCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: None,
        }
    }

    /// Entries older than `ttl` are treated as missing.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    // Every write is a single map operation, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.ttl.map_or(true, |ttl| entry.stored_at.elapsed() < ttl)
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let entries = self.read();
        entries
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let mut entries = self.write();
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Cached value for `key`, computing and storing it when absent or stale.
    pub fn get_or_insert_with(&self, key: CacheKey, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    /// Drop every entry of one analysis.
    pub fn invalidate(&self, analysis: &str) {
        let mut entries = self.write();
        entries.retain(|key, _| key.analysis != analysis);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for DatasetCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
