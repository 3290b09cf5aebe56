//! The materialized bundle of one opened store and its dataset cache.

use crate::cache::{CacheStats, ResourceCache};
use crate::store::{Store, StoreSupplier};
use crate::view::View;
use geodepot_core::{
    new_generation, Envelope, GeoResult, Generation, NameKey, ProviderConfig, StoreError,
    Timestamp, Version,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One opened store plus the names discovered when it was opened.
///
/// The set owns its store exclusively. Once closed, every operation fails
/// with [`StoreError::Closed`], so a handle that outlived a reload cannot
/// reach the store that replaced it.
pub struct ResourceSet {
    generation: Generation,
    provider_id: String,
    store: Box<dyn Store>,
    cache: ResourceCache,
    /// Datasets left out of the index at open time.
    skipped: usize,
    closed: AtomicBool,
    opened_at: Timestamp,
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("generation", &self.generation)
            .field("provider_id", &self.provider_id)
            .field("store", &self.store.kind())
            .field("datasets", &self.cache.len())
            .field("skipped", &self.skipped)
            .field("closed", &self.is_closed())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

impl ResourceSet {
    /// Open the store once and index its named datasets.
    ///
    /// A dataset whose name is missing, unreadable or invalid is skipped;
    /// only a failure to open or enumerate the store fails the whole open.
    pub fn open(
        provider_id: &str,
        config: &ProviderConfig,
        supplier: &dyn StoreSupplier,
    ) -> GeoResult<Self> {
        let store = supplier.open(config)?;

        let resources = match store.resources() {
            Ok(resources) => resources,
            Err(e) => {
                if let Err(close_err) = store.close() {
                    tracing::warn!(provider = %provider_id, error = %close_err, "Failed to close store after enumeration failure");
                }
                return Err(e.into());
            }
        };

        let cache = ResourceCache::new();
        let mut skipped = 0;
        for resource in resources {
            let native_name = match resource.identifier() {
                Ok(Some(name)) => name,
                Ok(None) => {
                    tracing::warn!(provider = %provider_id, "Skipping unnamed dataset");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(provider = %provider_id, error = %e, "Skipping dataset with unreadable name");
                    skipped += 1;
                    continue;
                }
            };
            let key = match NameKey::parse(&native_name) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(provider = %provider_id, error = %e, "Skipping dataset with invalid name");
                    skipped += 1;
                    continue;
                }
            };
            if !cache.insert(key.clone(), native_name) {
                tracing::warn!(provider = %provider_id, dataset = %key, "Duplicate dataset name, keeping the first");
                skipped += 1;
            }
        }

        let set = Self {
            generation: new_generation(),
            provider_id: provider_id.to_string(),
            store,
            cache,
            skipped,
            closed: AtomicBool::new(false),
            opened_at: chrono::Utc::now(),
        };
        tracing::info!(
            provider = %set.provider_id,
            generation = %set.generation,
            store = set.store.kind(),
            datasets = set.cache.len(),
            skipped = set.skipped,
            "Opened resource set"
        );
        Ok(set)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn opened_at(&self) -> Timestamp {
        self.opened_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Canonical dataset names in discovery order.
    pub fn names(&self) -> GeoResult<Vec<NameKey>> {
        self.ensure_open()?;
        Ok(self.cache.names())
    }

    pub fn dataset_count(&self) -> GeoResult<usize> {
        self.ensure_open()?;
        Ok(self.cache.len())
    }

    pub fn view(&self, name: &str, version: Option<Version>) -> GeoResult<Arc<View>> {
        self.ensure_open()?;
        self.cache
            .get(name, version, self.store.as_ref(), self.generation)
    }

    /// Datasets that were enumerated but could not be indexed.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn evict(&self, name: &str) -> GeoResult<bool> {
        self.ensure_open()?;
        self.cache.evict(name)
    }

    pub fn remove(&self, name: &str) -> GeoResult<bool> {
        self.ensure_open()?;
        self.cache.remove(name, self.store.as_ref())
    }

    /// Envelopes of every dataset that reports one.
    ///
    /// The sequence is lazy and is recomputed from the store on each call.
    /// Datasets that cannot be opened or report no envelope are skipped.
    pub fn envelopes(&self) -> GeoResult<impl Iterator<Item = Envelope> + '_> {
        self.ensure_open()?;
        let names = self.cache.names();
        Ok(names.into_iter().filter_map(move |key| {
            let entry = self.cache.resolve(key.as_str()).ok()?;
            let envelope = self
                .store
                .resource(entry.native_name())
                .and_then(|resource| resource.envelope());
            match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::debug!(provider = %self.provider_id, dataset = %key, error = %e, "Skipping dataset envelope");
                    None
                }
            }
        }))
    }

    /// The backing store, for capability queries.
    pub fn store(&self) -> GeoResult<&dyn Store> {
        self.ensure_open()?;
        Ok(self.store.as_ref())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Close the backing store. Only the first call reaches the store.
    pub fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(provider = %self.provider_id, generation = %self.generation, "Closing resource set");
        self.store.close()
    }
}

impl Drop for ResourceSet {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(provider = %self.provider_id, generation = %self.generation, error = %e, "Failed to close dropped resource set");
        }
    }
}
