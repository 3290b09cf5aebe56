//! Name-indexed cache of per-dataset views.
//!
//! Each dataset gets one [`CacheEntry`] holding a [`Weak`] reference to the
//! last view built for it. The cache never keeps a view alive on its own:
//! once every caller drops its `Arc<View>` the view is reclaimed and the next
//! unversioned access rebuilds it from the store.

use crate::store::Store;
use crate::view::View;
use geodepot_core::{GeoError, GeoResult, Generation, NameKey, Version};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// One indexed dataset.
#[derive(Debug)]
pub struct CacheEntry {
    key: NameKey,
    /// Name as the store spelled it, used for every store call.
    native_name: String,
    view: Mutex<Weak<View>>,
}

impl CacheEntry {
    fn new(key: NameKey, native_name: String) -> Self {
        Self {
            key,
            native_name,
            view: Mutex::new(Weak::new()),
        }
    }

    pub fn key(&self) -> &NameKey {
        &self.key
    }

    pub fn native_name(&self) -> &str {
        &self.native_name
    }

    /// Whether a previously built view is still alive.
    pub fn is_live(&self) -> bool {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .strong_count()
            > 0
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Unversioned reads served by a live view.
    pub hits: u64,
    /// Unversioned reads that had to build a view.
    pub misses: u64,
    /// Versioned reads, which always build.
    pub bypasses: u64,
    /// Number of indexed datasets.
    pub entry_count: u64,
    /// Entries whose view is currently alive.
    pub live_views: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Insertion-ordered table of dataset entries keyed by canonical name.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: RwLock<IndexMap<NameKey, Arc<CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<NameKey, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<NameKey, Arc<CacheEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index a dataset. Returns false if the key is already present; the
    /// first registration wins.
    pub fn insert(&self, key: NameKey, native_name: impl Into<String>) -> bool {
        let mut entries = self.write_entries();
        if entries.contains_key(&key) {
            return false;
        }
        let entry = Arc::new(CacheEntry::new(key.clone(), native_name.into()));
        entries.insert(key, entry);
        true
    }

    /// Canonical names in discovery order.
    pub fn names(&self) -> Vec<NameKey> {
        self.read_entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the entry a raw name refers to.
    ///
    /// Exact canonical match first. Failing that, the tip fallback accepts an
    /// entry whose segments are a suffix of the query's (or vice versa), but
    /// only if exactly one entry qualifies.
    pub fn resolve(&self, raw: &str) -> GeoResult<Arc<CacheEntry>> {
        let query = NameKey::parse(raw)?;
        let entries = self.read_entries();

        if let Some(entry) = entries.get(&query) {
            return Ok(Arc::clone(entry));
        }

        let mut candidates = entries.values().filter(|entry| {
            entry.key.tip() == query.tip()
                && (query.is_suffix_of(&entry.key) || entry.key.is_suffix_of(&query))
        });
        match (candidates.next(), candidates.next()) {
            (Some(entry), None) => {
                tracing::debug!(query = %query, resolved = %entry.key, "Resolved dataset by tip name");
                Ok(Arc::clone(entry))
            }
            (Some(_), Some(_)) => {
                tracing::debug!(query = %query, "Tip name is ambiguous, refusing to guess");
                Err(GeoError::not_found(query.as_str()))
            }
            (None, _) => Err(GeoError::not_found(query.as_str())),
        }
    }

    /// Return the view of a dataset.
    ///
    /// A versioned read always builds a fresh view; an unversioned read
    /// reuses the live cached view or rebuilds and re-caches it.
    pub fn get(
        &self,
        raw: &str,
        version: Option<Version>,
        store: &dyn Store,
        generation: Generation,
    ) -> GeoResult<Arc<View>> {
        let entry = self.resolve(raw)?;

        if let Some(version) = version {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            let resource = store.resource_at(&entry.native_name, version)?;
            let view = View::build(entry.key.clone(), resource, generation, Some(version))?;
            return Ok(Arc::new(view));
        }

        // Holding the entry lock while building keeps concurrent readers of
        // the same dataset from building it twice.
        let mut cached = entry.view.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = cached.upgrade() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(view);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resource = store.resource(&entry.native_name)?;
        let view = Arc::new(View::build(entry.key.clone(), resource, generation, None)?);
        *cached = Arc::downgrade(&view);
        tracing::trace!(dataset = %entry.key, kind = %view.kind(), "Built dataset view");
        Ok(view)
    }

    /// Forget the cached view of a dataset, as if it had been reclaimed.
    pub fn evict(&self, raw: &str) -> GeoResult<bool> {
        let entry = self.resolve(raw)?;
        let mut cached = entry.view.lock().unwrap_or_else(PoisonError::into_inner);
        let was_live = cached.strong_count() > 0;
        *cached = Weak::new();
        Ok(was_live)
    }

    /// Remove a dataset from the store and from the index.
    ///
    /// Returns `Ok(false)` when the store supports neither delete-by-name nor
    /// remove-resource.
    pub fn remove(&self, raw: &str, store: &dyn Store) -> GeoResult<bool> {
        let entry = self.resolve(raw)?;

        if let Some(writer) = store.as_feature_writer() {
            writer.delete_by_name(&entry.native_name)?;
        } else if let Some(aggregate) = store.as_aggregate_writer() {
            let resource = store.resource(&entry.native_name)?;
            aggregate.remove_resource(resource.as_ref())?;
        } else {
            tracing::debug!(dataset = %entry.key, kind = store.kind(), "Store does not support removal");
            return Ok(false);
        }

        self.write_entries().shift_remove(&entry.key);
        Ok(true)
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.read_entries();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            live_views: entries.values().filter(|entry| entry.is_live()).count() as u64,
        }
    }
}
