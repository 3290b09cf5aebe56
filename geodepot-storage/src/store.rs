//! Collaborator interface: the backing stores a provider opens.
//!
//! Concrete formats (shapefiles, GeoTIFF mosaics, PostGIS schemas, sensor
//! observation stores) live outside this crate. They plug in by implementing
//! [`Store`] and [`Resource`]; optional abilities are exposed through
//! `as_*` capability queries rather than through the trait hierarchy, so the
//! access layer can decide at runtime what a given store can do.

use geodepot_core::{Envelope, ProviderConfig, StoreError, StoreMetadata, Version};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// RESOURCES
// ============================================================================

/// One dataset inside a store.
pub trait Resource: Send + Sync + fmt::Debug {
    /// The name the store knows this dataset by.
    ///
    /// `Ok(None)` marks an unnamed dataset, which is never indexed.
    fn identifier(&self) -> Result<Option<String>, StoreError>;

    /// Spatial extent, when it can be computed.
    fn envelope(&self) -> Result<Option<Envelope>, StoreError> {
        Ok(None)
    }

    /// Gridded-coverage capability.
    fn as_grid(&self) -> Option<&dyn GridResource> {
        None
    }

    /// Feature-collection capability.
    fn as_features(&self) -> Option<&dyn FeatureSet> {
        None
    }
}

/// Invalid grid geometry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridGeometryError {
    #[error("Grid extent {width}x{height} has no cells")]
    EmptyExtent { width: u32, height: u32 },
}

/// Shape of a gridded coverage.
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub width: u32,
    pub height: u32,
    pub envelope: Option<Envelope>,
}

impl GridGeometry {
    pub fn new(width: u32, height: u32, envelope: Option<Envelope>) -> Result<Self, GridGeometryError> {
        if width == 0 || height == 0 {
            return Err(GridGeometryError::EmptyExtent { width, height });
        }
        Ok(Self {
            width,
            height,
            envelope,
        })
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Raster capability of a resource.
pub trait GridResource: Send + Sync {
    fn grid_geometry(&self) -> Result<GridGeometry, StoreError>;

    /// Band / sample dimension names.
    fn sample_dimensions(&self) -> Result<Vec<String>, StoreError>;
}

/// Schema of a feature collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureType {
    pub name: String,
    pub attributes: Vec<String>,
    pub geometry_attribute: Option<String>,
}

/// Tabular capability of a resource.
pub trait FeatureSet: Send + Sync {
    fn feature_type(&self) -> Result<FeatureType, StoreError>;

    /// Exact count when cheap to obtain, `None` otherwise.
    fn feature_count(&self) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }
}

// ============================================================================
// STORES
// ============================================================================

/// An opened backing store.
///
/// A store is exclusively owned by one resource set and closed with it.
/// Methods take `&self`; implementations guard their own internal state.
pub trait Store: Send + Sync {
    /// Short format name, used in log fields.
    fn kind(&self) -> &str;

    /// Enumerate every dataset the store exposes, named or not.
    fn resources(&self) -> Result<Vec<Arc<dyn Resource>>, StoreError>;

    /// Open the current state of a dataset by its store-native name.
    fn resource(&self, name: &str) -> Result<Arc<dyn Resource>, StoreError>;

    /// Open a dataset as it was at `version`.
    fn resource_at(&self, name: &str, version: Version) -> Result<Arc<dyn Resource>, StoreError> {
        let _ = (name, version);
        Err(StoreError::Unsupported {
            operation: "versioned read".to_string(),
        })
    }

    /// Store-level metadata, when the format carries it.
    fn metadata(&self) -> Result<Option<StoreMetadata>, StoreError> {
        Ok(None)
    }

    /// Whether the store holds sensor observations.
    fn is_sensor_capable(&self) -> bool {
        false
    }

    /// Delete-by-name capability of mutable tabular stores.
    fn as_feature_writer(&self) -> Option<&dyn FeatureWriter> {
        None
    }

    /// Remove-resource capability of mutable aggregate stores.
    fn as_aggregate_writer(&self) -> Option<&dyn AggregateWriter> {
        None
    }

    /// Component files of file-backed stores.
    fn as_file_set(&self) -> Option<&dyn FileSet> {
        None
    }

    /// Release the store's resources. Called once, by the owning resource set.
    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Mutable tabular store.
pub trait FeatureWriter: Send + Sync {
    fn delete_by_name(&self, name: &str) -> Result<(), StoreError>;

    /// Drop store-level structure (e.g. the backing schema) once every
    /// dataset is gone. Returns whether anything was dropped.
    fn purge(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Mutable aggregate store.
pub trait AggregateWriter: Send + Sync {
    fn remove_resource(&self, resource: &dyn Resource) -> Result<(), StoreError>;
}

/// File-backed store.
pub trait FileSet: Send + Sync {
    fn component_files(&self) -> Result<Vec<PathBuf>, StoreError>;
}

// ============================================================================
// SUPPLIER
// ============================================================================

/// Opens a store from provider configuration. Invoked once per resource set,
/// i.e. again after every reload.
pub trait StoreSupplier: Send + Sync {
    fn open(&self, config: &ProviderConfig) -> Result<Box<dyn Store>, StoreError>;

    /// Loggable description; must not include secrets.
    fn describe(&self) -> String {
        "store supplier".to_string()
    }
}

impl<F> StoreSupplier for F
where
    F: Fn(&ProviderConfig) -> Result<Box<dyn Store>, StoreError> + Send + Sync,
{
    fn open(&self, config: &ProviderConfig) -> Result<Box<dyn Store>, StoreError> {
        self(config)
    }
}
