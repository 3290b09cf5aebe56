//! Provider facade: one access guard in front of one lazily opened
//! resource set.
//!
//! Every public operation opens exactly one session for its whole duration.
//! Sessions release on drop, so early returns and panics never leave a
//! permit behind.

use crate::cache::CacheStats;
use crate::guard::{AccessGuard, ReadSession, Session, WriteSession};
use crate::resource_set::ResourceSet;
use crate::store::StoreSupplier;
use crate::view::View;
use geodepot_core::{
    CrsId, Envelope, GeoError, GeoResult, Generation, HealthCheck, MetadataSource, NameKey,
    PartialFailure, ProviderConfig, ProviderDescription, RemovalReport, StoreError, Version,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Public entry point to one backing store.
pub struct Provider {
    id: String,
    config: Arc<ProviderConfig>,
    supplier: Box<dyn StoreSupplier>,
    guard: AccessGuard,
    /// Replaced only under a write permit.
    slot: Mutex<Option<Arc<ResourceSet>>>,
    /// Why the last attempt to open the store failed; cleared on success.
    last_failure: Mutex<Option<StoreError>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("kind", &self.config.kind)
            .field("location", &self.config.redacted_location())
            .field("supplier", &self.supplier.describe())
            .field("generation", &self.generation())
            .finish()
    }
}

impl Provider {
    /// Build a provider. No I/O happens until the first operation.
    pub fn new(config: ProviderConfig, supplier: impl StoreSupplier + 'static) -> GeoResult<Self> {
        config.validate()?;
        let guard = AccessGuard::new(config.access.lock_timeout());
        tracing::debug!(
            provider = %config.id,
            kind = %config.kind,
            location = %config.redacted_location(),
            supplier = %supplier.describe(),
            "Created provider"
        );
        Ok(Self {
            id: config.id.clone(),
            config: Arc::new(config),
            supplier: Box::new(supplier),
            guard,
            slot: Mutex::new(None),
            last_failure: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The guard, for diagnostics.
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn is_materialized(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Generation of the current resource set, if one is open.
    pub fn generation(&self) -> Option<Generation> {
        self.lock_slot().as_ref().map(|set| set.generation())
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<ResourceSet>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Arc<ResourceSet>> {
        self.lock_slot().clone()
    }

    fn lock_failure(&self) -> MutexGuard<'_, Option<StoreError>> {
        self.last_failure.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the current resource set, opening it under an exclusive
    /// permit if there is none.
    fn materialize<S: Session>(&self, session: &mut S) -> GeoResult<Arc<ResourceSet>> {
        if let Some(set) = self.current() {
            return Ok(set);
        }
        session.elevate(|| -> GeoResult<Arc<ResourceSet>> {
            // The read permit may have been released while queuing for the
            // write permit; another writer may have opened the set meanwhile.
            if let Some(set) = self.current() {
                return Ok(set);
            }
            let set = match ResourceSet::open(&self.id, &self.config, self.supplier.as_ref()) {
                Ok(set) => Arc::new(set),
                Err(e) => {
                    if let GeoError::Store(store_err) = &e {
                        *self.lock_failure() = Some(store_err.clone());
                    }
                    return Err(e);
                }
            };
            *self.lock_failure() = None;
            *self.lock_slot() = Some(Arc::clone(&set));
            Ok(set)
        })?
    }

    fn read_session(&self) -> GeoResult<ReadSession<'_>> {
        self.guard.open_read()
    }

    fn write_session(&self) -> GeoResult<WriteSession<'_>> {
        self.guard.open_write()
    }

    /// Run one operation and log surfaced failures with provider context.
    /// Soft misses and contention are not logged here.
    fn observed<T>(&self, operation: &'static str, op: impl FnOnce() -> GeoResult<T>) -> GeoResult<T> {
        let result = op();
        if let Err(e) = &result {
            if !e.is_not_found() && !e.is_retryable() {
                tracing::error!(provider = %self.id, operation, error = %e, "Provider operation failed");
            }
        }
        result
    }

    fn close_set(&self, set: &ResourceSet, operation: &'static str) {
        if let Err(e) = set.close() {
            tracing::warn!(
                provider = %self.id,
                operation,
                generation = %set.generation(),
                error = %e,
                "Failed to close resource set"
            );
        }
    }

    // ========================================================================
    // READ OPERATIONS
    // ========================================================================

    /// Canonical dataset names in discovery order.
    pub fn keys(&self) -> GeoResult<Vec<NameKey>> {
        self.observed("keys", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            set.names()
        })
    }

    /// View of a dataset, `None` when the name does not resolve.
    ///
    /// With a version the view is always built fresh.
    pub fn get(&self, name: &str, version: Option<Version>) -> GeoResult<Option<Arc<View>>> {
        self.observed("get", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            match set.view(name, version) {
                Ok(view) => Ok(Some(view)),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(provider = %self.id, dataset = name, "Dataset not found");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Aggregate metadata of the current resource set.
    ///
    /// Native store metadata wins; without it the dataset envelopes are
    /// scanned and combined.
    pub fn describe(&self) -> GeoResult<ProviderDescription> {
        self.observed("describe", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            let store = set.store()?;

            let native = match store.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(provider = %self.id, operation = "describe", error = %e, "Store metadata unreadable");
                    None
                }
            };
            let title = native.as_ref().and_then(|m| m.title.clone());

            let (envelope, crs, source) = match native {
                Some(metadata) if !metadata.is_empty() => {
                    let crs = metadata
                        .crs
                        .or_else(|| metadata.envelope.as_ref().and_then(|e| e.crs.clone()));
                    (metadata.envelope, crs, MetadataSource::Native)
                }
                _ => {
                    tracing::info!(provider = %self.id, operation = "describe", "Store reports no metadata, scanning dataset envelopes");
                    let envelope = self.scan_envelopes(&set)?;
                    let crs = envelope.as_ref().and_then(|e| e.crs.clone());
                    let source = match envelope {
                        Some(_) => MetadataSource::Scanned,
                        None => MetadataSource::Unavailable,
                    };
                    (envelope, crs, source)
                }
            };

            Ok(ProviderDescription {
                provider_id: self.id.clone(),
                generation: set.generation(),
                dataset_count: set.dataset_count()?,
                title,
                envelope,
                crs,
                source,
                described_at: chrono::Utc::now(),
            })
        })
    }

    /// Union of every dataset envelope; envelopes in a CRS different from
    /// the first one seen are skipped.
    fn scan_envelopes(&self, set: &ResourceSet) -> GeoResult<Option<Envelope>> {
        let mut combined: Option<Envelope> = None;
        for envelope in set.envelopes()? {
            combined = match combined {
                None => Some(envelope),
                Some(acc) => match acc.union(&envelope) {
                    Ok(union) => Some(union),
                    Err(e) => {
                        tracing::warn!(provider = %self.id, operation = "describe", error = %e, "Skipping envelope");
                        Some(acc)
                    }
                },
            };
        }
        Ok(combined)
    }

    /// Whether the store holds sensor observations.
    pub fn is_sensor_capable(&self) -> GeoResult<bool> {
        self.observed("is_sensor_capable", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            Ok(set.store()?.is_sensor_capable())
        })
    }

    /// Files making up a file-backed store; empty for other stores.
    pub fn component_files(&self) -> GeoResult<Vec<PathBuf>> {
        self.observed("component_files", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            match set.store()?.as_file_set() {
                Some(files) => Ok(files.component_files()?),
                None => Ok(Vec::new()),
            }
        })
    }

    /// CRS reported by the store, else the first one found on a dataset.
    pub fn crs_identifier(&self) -> GeoResult<Option<CrsId>> {
        self.observed("crs_identifier", || {
            let mut session = self.read_session()?;
            let set = self.materialize(&mut session)?;
            let store = set.store()?;
            match store.metadata() {
                Ok(Some(metadata)) => {
                    let crs = metadata
                        .crs
                        .or_else(|| metadata.envelope.and_then(|e| e.crs));
                    if crs.is_some() {
                        return Ok(crs);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(provider = %self.id, operation = "crs_identifier", error = %e, "Store metadata unreadable");
                }
            }
            let crs = set.envelopes()?.find_map(|e| e.crs);
            Ok(crs)
        })
    }

    /// Cache counters of the current resource set.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.current().map(|set| set.cache_stats())
    }

    /// Health probe. Never opens the store.
    pub fn health(&self) -> HealthCheck {
        let component = format!("provider:{}", self.id);
        let Some(set) = self.current() else {
            if let Some(failure) = self.lock_failure().clone() {
                return HealthCheck::unhealthy(component, failure.to_string());
            }
            return HealthCheck::unknown(component, "Resource set not materialized");
        };
        let count = match set.dataset_count() {
            Ok(count) => count,
            Err(e) => return HealthCheck::unhealthy(component, e.to_string()),
        };
        let check = match set.skipped_count() {
            0 => HealthCheck::healthy(component),
            skipped => HealthCheck::degraded(component, format!("{skipped} datasets could not be indexed")),
        };
        check
            .with_metadata("datasets", serde_json::json!(count))
            .with_metadata("generation", serde_json::json!(set.generation().to_string()))
    }

    // ========================================================================
    // STRUCTURAL OPERATIONS
    // ========================================================================

    /// Remove one dataset. `false` when the name is unknown or the store
    /// cannot remove datasets.
    pub fn remove(&self, name: &str) -> GeoResult<bool> {
        self.observed("remove", || {
            let mut session = self.write_session()?;
            let set = self.materialize(&mut session)?;
            match set.remove(name) {
                Ok(removed) => {
                    if removed {
                        tracing::info!(provider = %self.id, operation = "remove", dataset = name, "Removed dataset");
                    }
                    Ok(removed)
                }
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    /// Remove every dataset, then purge store-level structure.
    ///
    /// Best effort: a dataset that cannot be removed is reported in
    /// [`RemovalReport::skipped`] and the wipe carries on.
    pub fn remove_all(&self) -> GeoResult<RemovalReport> {
        self.observed("remove_all", || {
            let mut session = self.write_session()?;
            let set = self.materialize(&mut session)?;
            let mut report = RemovalReport::default();

            for key in set.names()? {
                match set.remove(key.as_str()) {
                    Ok(true) => report.removed.push(key),
                    Ok(false) => report.skipped.push(PartialFailure {
                        name: key.to_string(),
                        reason: "store does not support removal".to_string(),
                    }),
                    Err(e) => {
                        tracing::warn!(provider = %self.id, operation = "remove_all", dataset = %key, error = %e, "Skipping dataset");
                        report.skipped.push(PartialFailure {
                            name: key.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if let Some(writer) = set.store()?.as_feature_writer() {
                match writer.purge() {
                    Ok(purged) => report.purged = purged,
                    Err(e) => {
                        tracing::warn!(provider = %self.id, operation = "remove_all", error = %e, "Failed to purge store");
                        report.skipped.push(PartialFailure {
                            name: set.store()?.kind().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            tracing::info!(
                provider = %self.id,
                operation = "remove_all",
                removed = report.removed.len(),
                skipped = report.skipped.len(),
                purged = report.purged,
                "Removed datasets"
            );
            Ok(report)
        })
    }

    /// Close and discard the current resource set. The next operation
    /// reopens the store.
    pub fn reload(&self) -> GeoResult<()> {
        self.observed("reload", || {
            let _session = self.write_session()?;
            let previous = self.lock_slot().take();
            if let Some(set) = previous {
                self.close_set(&set, "reload");
                tracing::info!(provider = %self.id, operation = "reload", generation = %set.generation(), "Discarded resource set");
            }
            Ok(())
        })
    }

    /// Close the current resource set, if any. Failures are logged only.
    pub fn dispose(&self) {
        let session = match self.write_session() {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(provider = %self.id, operation = "dispose", error = %e, "Could not dispose provider");
                return;
            }
        };
        *self.lock_failure() = None;
        let previous = self.lock_slot().take();
        if let Some(set) = previous {
            self.close_set(&set, "dispose");
            tracing::info!(provider = %self.id, operation = "dispose", "Disposed resource set");
        }
        drop(session);
    }
}
