//! In-process store for tests, fixtures and local development.

use crate::store::{
    AggregateWriter, FeatureSet, FeatureType, FeatureWriter, FileSet, GridGeometry, GridResource,
    Resource, Store,
};
use geodepot_core::{DatasetKind, Envelope, StoreError, StoreMetadata, Version};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A dataset held in memory.
#[derive(Debug, Clone)]
pub struct MemoryResource {
    name: Option<String>,
    kind: DatasetKind,
    envelope: Option<Envelope>,
    broken: bool,
    broken_envelope: bool,
    feature_count: Option<u64>,
}

impl MemoryResource {
    fn with_kind(name: Option<String>, kind: DatasetKind) -> Self {
        Self {
            name,
            kind,
            envelope: None,
            broken: false,
            broken_envelope: false,
            feature_count: None,
        }
    }

    pub fn feature(name: impl Into<String>) -> Self {
        Self::with_kind(Some(name.into()), DatasetKind::Feature)
    }

    pub fn grid(name: impl Into<String>) -> Self {
        Self::with_kind(Some(name.into()), DatasetKind::Grid)
    }

    pub fn opaque(name: impl Into<String>) -> Self {
        Self::with_kind(Some(name.into()), DatasetKind::Opaque)
    }

    /// A dataset that reports no name.
    pub fn unnamed() -> Self {
        Self::with_kind(None, DatasetKind::Feature)
    }

    /// A dataset whose name cannot be read.
    pub fn broken(name: impl Into<String>) -> Self {
        Self {
            broken: true,
            ..Self::feature(name)
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    /// Make envelope computation fail.
    pub fn with_broken_envelope(mut self) -> Self {
        self.broken_envelope = true;
        self
    }

    pub fn with_feature_count(mut self, count: u64) -> Self {
        self.feature_count = Some(count);
        self
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn is_named(&self, name: &str) -> bool {
        !self.broken && self.name.as_deref() == Some(name)
    }
}

impl Resource for MemoryResource {
    fn identifier(&self) -> Result<Option<String>, StoreError> {
        if self.broken {
            return Err(StoreError::Read {
                name: self.label().to_string(),
                reason: "identifier unreadable".to_string(),
            });
        }
        Ok(self.name.clone())
    }

    fn envelope(&self) -> Result<Option<Envelope>, StoreError> {
        if self.broken_envelope {
            return Err(StoreError::Read {
                name: self.label().to_string(),
                reason: "envelope unreadable".to_string(),
            });
        }
        Ok(self.envelope.clone())
    }

    fn as_grid(&self) -> Option<&dyn GridResource> {
        match self.kind {
            DatasetKind::Grid => Some(self),
            _ => None,
        }
    }

    fn as_features(&self) -> Option<&dyn FeatureSet> {
        match self.kind {
            DatasetKind::Feature => Some(self),
            _ => None,
        }
    }
}

impl GridResource for MemoryResource {
    fn grid_geometry(&self) -> Result<GridGeometry, StoreError> {
        GridGeometry::new(256, 256, self.envelope.clone()).map_err(|e| StoreError::Read {
            name: self.label().to_string(),
            reason: e.to_string(),
        })
    }

    fn sample_dimensions(&self) -> Result<Vec<String>, StoreError> {
        Ok(vec!["band_1".to_string()])
    }
}

impl FeatureSet for MemoryResource {
    fn feature_type(&self) -> Result<FeatureType, StoreError> {
        Ok(FeatureType {
            name: self.label().to_string(),
            attributes: vec!["id".to_string(), "geom".to_string()],
            geometry_attribute: Some("geom".to_string()),
        })
    }

    fn feature_count(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.feature_count)
    }
}

/// Which removal capability a [`MemoryStore`] exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemovalMode {
    /// Read-only store.
    #[default]
    Unsupported,
    /// Mutable tabular store (delete by name).
    DeleteByName,
    /// Mutable aggregate store (remove resource).
    Aggregate,
}

/// A store whose datasets live in a vector.
///
/// Capabilities are switched on with the builder methods; the store itself
/// is mutable through `&self` so tests can change its contents between
/// reloads.
#[derive(Debug)]
pub struct MemoryStore {
    kind: String,
    resources: RwLock<Vec<Arc<MemoryResource>>>,
    removal: RemovalMode,
    metadata: Option<StoreMetadata>,
    files: Option<Vec<PathBuf>>,
    sensor: bool,
    versioned: bool,
    fail_enumerate: bool,
    fail_metadata: bool,
    fail_close: bool,
    protected: Vec<String>,
    purgeable: bool,
    purged: AtomicBool,
    closes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            resources: RwLock::new(Vec::new()),
            removal: RemovalMode::default(),
            metadata: None,
            files: None,
            sensor: false,
            versioned: false,
            fail_enumerate: false,
            fail_metadata: false,
            fail_close: false,
            protected: Vec::new(),
            purgeable: false,
            purged: AtomicBool::new(false),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store holding one feature dataset per name.
    pub fn with_features<I, S>(kind: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new(kind);
        for name in names {
            store.add(MemoryResource::feature(name));
        }
        store
    }

    pub fn with_removal(mut self, removal: RemovalMode) -> Self {
        self.removal = removal;
        self
    }

    pub fn with_metadata(mut self, metadata: StoreMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn sensor_capable(mut self) -> Self {
        self.sensor = true;
        self
    }

    /// Accept versioned reads, answering with the current state.
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumerate = true;
        self
    }

    pub fn failing_metadata(mut self) -> Self {
        self.fail_metadata = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Make removal of `name` fail.
    pub fn protect(mut self, name: impl Into<String>) -> Self {
        self.protected.push(name.into());
        self
    }

    /// Let [`FeatureWriter::purge`] drop the (simulated) backing schema.
    pub fn purgeable(mut self) -> Self {
        self.purgeable = true;
        self
    }

    /// Count closes into a counter shared with the test.
    pub fn with_close_counter(mut self, closes: Arc<AtomicUsize>) -> Self {
        self.closes = closes;
        self
    }

    pub fn add(&self, resource: MemoryResource) {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(resource));
    }

    /// Names of every readable, named dataset.
    pub fn names(&self) -> Vec<String> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| !r.broken)
            .filter_map(|r| r.name.clone())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_purged(&self) -> bool {
        self.purged.load(Ordering::SeqCst)
    }

    fn find(&self, name: &str) -> Option<Arc<MemoryResource>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.is_named(name))
            .cloned()
    }

    fn remove_named(&self, name: &str) -> Result<(), StoreError> {
        if self.protected.iter().any(|p| p == name) {
            return Err(StoreError::Mutate {
                name: name.to_string(),
                reason: "dataset is protected".to_string(),
            });
        }
        let mut resources = self.resources.write().unwrap_or_else(PoisonError::into_inner);
        let before = resources.len();
        resources.retain(|r| !r.is_named(name));
        if resources.len() == before {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn resources(&self) -> Result<Vec<Arc<dyn Resource>>, StoreError> {
        if self.fail_enumerate {
            return Err(StoreError::Enumerate {
                reason: "listing unavailable".to_string(),
            });
        }
        Ok(self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| Arc::clone(r) as Arc<dyn Resource>)
            .collect())
    }

    fn resource(&self, name: &str) -> Result<Arc<dyn Resource>, StoreError> {
        self.find(name)
            .map(|r| r as Arc<dyn Resource>)
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }

    fn resource_at(&self, name: &str, version: Version) -> Result<Arc<dyn Resource>, StoreError> {
        if !self.versioned {
            return Err(StoreError::Unsupported {
                operation: "versioned read".to_string(),
            });
        }
        tracing::trace!(dataset = name, %version, "Versioned read of in-memory dataset");
        self.resource(name)
    }

    fn metadata(&self) -> Result<Option<StoreMetadata>, StoreError> {
        if self.fail_metadata {
            return Err(StoreError::Read {
                name: "metadata".to_string(),
                reason: "metadata table unreadable".to_string(),
            });
        }
        Ok(self.metadata.clone())
    }

    fn is_sensor_capable(&self) -> bool {
        self.sensor
    }

    fn as_feature_writer(&self) -> Option<&dyn FeatureWriter> {
        match self.removal {
            RemovalMode::DeleteByName => Some(self),
            _ => None,
        }
    }

    fn as_aggregate_writer(&self) -> Option<&dyn AggregateWriter> {
        match self.removal {
            RemovalMode::Aggregate => Some(self),
            _ => None,
        }
    }

    fn as_file_set(&self) -> Option<&dyn FileSet> {
        self.files.as_ref().map(|_| self as &dyn FileSet)
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(StoreError::Close {
                reason: "handle already invalid".to_string(),
            });
        }
        Ok(())
    }
}

impl FeatureWriter for MemoryStore {
    fn delete_by_name(&self, name: &str) -> Result<(), StoreError> {
        self.remove_named(name)
    }

    fn purge(&self) -> Result<bool, StoreError> {
        if !self.purgeable {
            return Ok(false);
        }
        Ok(!self.purged.swap(true, Ordering::SeqCst))
    }
}

impl AggregateWriter for MemoryStore {
    fn remove_resource(&self, resource: &dyn Resource) -> Result<(), StoreError> {
        let name = resource.identifier()?.ok_or_else(|| StoreError::Mutate {
            name: "<unnamed>".to_string(),
            reason: "cannot remove an unnamed dataset".to_string(),
        })?;
        self.remove_named(&name)
    }
}

impl FileSet for MemoryStore {
    fn component_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        Ok(self.files.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_skip_unnamed_and_broken() {
        let store = MemoryStore::with_features("memory", ["a:b"]);
        store.add(MemoryResource::unnamed());
        store.add(MemoryResource::broken("a:x"));
        assert_eq!(store.names(), ["a:b"]);
        assert_eq!(store.resources().unwrap().len(), 3);
        assert!(store.resource("a:x").is_err());
    }

    #[test]
    fn test_capabilities_follow_removal_mode() {
        let read_only = MemoryStore::new("memory");
        assert!(read_only.as_feature_writer().is_none());
        assert!(read_only.as_aggregate_writer().is_none());

        let tabular = MemoryStore::new("memory").with_removal(RemovalMode::DeleteByName);
        assert!(tabular.as_feature_writer().is_some());
        assert!(tabular.as_aggregate_writer().is_none());

        let aggregate = MemoryStore::new("memory").with_removal(RemovalMode::Aggregate);
        assert!(aggregate.as_aggregate_writer().is_some());
    }

    #[test]
    fn test_protected_removal_fails() {
        let store = MemoryStore::with_features("memory", ["a:b"]).protect("a:b");
        let err = store.delete_by_name("a:b").unwrap_err();
        assert!(matches!(err, StoreError::Mutate { .. }));
        assert_eq!(store.names(), ["a:b"]);
    }

    #[test]
    fn test_purge_only_once() {
        let store = MemoryStore::new("memory").purgeable();
        assert!(store.purge().unwrap());
        assert!(!store.purge().unwrap());
        assert!(store.is_purged());
        assert!(!MemoryStore::new("memory").purge().unwrap());
    }

    #[test]
    fn test_close_counter_is_shared() {
        let closes = Arc::new(AtomicUsize::new(0));
        let store = MemoryStore::new("memory").with_close_counter(Arc::clone(&closes));
        store.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(store.close_count(), 1);
    }

    #[test]
    fn test_resource_kinds() {
        assert!(MemoryResource::grid("g").as_grid().is_some());
        assert!(MemoryResource::feature("f").as_features().is_some());
        let opaque = MemoryResource::opaque("o");
        assert!(opaque.as_grid().is_none() && opaque.as_features().is_none());
    }
}
