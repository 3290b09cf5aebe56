//! Per-dataset views handed to callers.
//!
//! A view is built once from an opened [`Resource`] and never mutated
//! afterwards, so callers may use it without holding any session.

use crate::store::{FeatureType, GridGeometry, Resource};
use geodepot_core::{DatasetKind, Generation, NameKey, StoreError, Timestamp, Version};
use std::sync::Arc;

/// Identity shared by all view variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewHeader {
    pub key: NameKey,
    /// Resource set the view was built from.
    pub generation: Generation,
    /// `None` for the current state of the dataset.
    pub version: Option<Version>,
    pub built_at: Timestamp,
}

/// Gridded coverage view.
#[derive(Debug, Clone)]
pub struct GridView {
    header: ViewHeader,
    geometry: GridGeometry,
    sample_dimensions: Vec<String>,
    resource: Arc<dyn Resource>,
}

impl GridView {
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn sample_dimensions(&self) -> &[String] {
        &self.sample_dimensions
    }
}

/// Feature collection view.
#[derive(Debug, Clone)]
pub struct FeatureView {
    header: ViewHeader,
    feature_type: FeatureType,
    feature_count: Option<u64>,
    resource: Arc<dyn Resource>,
}

impl FeatureView {
    pub fn feature_type(&self) -> &FeatureType {
        &self.feature_type
    }

    pub fn feature_count(&self) -> Option<u64> {
        self.feature_count
    }
}

/// View over a resource with no recognized capability.
#[derive(Debug, Clone)]
pub struct OpaqueView {
    header: ViewHeader,
    resource: Arc<dyn Resource>,
}

/// A dataset as seen by callers, one variant per capability.
#[derive(Debug, Clone)]
pub enum View {
    Grid(GridView),
    Feature(FeatureView),
    Opaque(OpaqueView),
}

impl View {
    /// Build the view variant matching the resource's capabilities.
    ///
    /// Grid capability wins over feature capability when a resource reports
    /// both.
    pub fn build(
        key: NameKey,
        resource: Arc<dyn Resource>,
        generation: Generation,
        version: Option<Version>,
    ) -> Result<View, StoreError> {
        let header = ViewHeader {
            key,
            generation,
            version,
            built_at: chrono::Utc::now(),
        };

        if let Some(grid) = resource.as_grid() {
            let geometry = grid.grid_geometry()?;
            let sample_dimensions = grid.sample_dimensions()?;
            return Ok(View::Grid(GridView {
                header,
                geometry,
                sample_dimensions,
                resource,
            }));
        }

        if let Some(features) = resource.as_features() {
            let feature_type = features.feature_type()?;
            let feature_count = features.feature_count()?;
            return Ok(View::Feature(FeatureView {
                header,
                feature_type,
                feature_count,
                resource,
            }));
        }

        Ok(View::Opaque(OpaqueView { header, resource }))
    }

    pub fn header(&self) -> &ViewHeader {
        match self {
            View::Grid(v) => &v.header,
            View::Feature(v) => &v.header,
            View::Opaque(v) => &v.header,
        }
    }

    pub fn key(&self) -> &NameKey {
        &self.header().key
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            View::Grid(_) => DatasetKind::Grid,
            View::Feature(_) => DatasetKind::Feature,
            View::Opaque(_) => DatasetKind::Opaque,
        }
    }

    /// The underlying resource, for format-specific access.
    pub fn resource(&self) -> &Arc<dyn Resource> {
        match self {
            View::Grid(v) => &v.resource,
            View::Feature(v) => &v.resource,
            View::Opaque(v) => &v.resource,
        }
    }

    pub fn as_grid(&self) -> Option<&GridView> {
        match self {
            View::Grid(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_feature(&self) -> Option<&FeatureView> {
        match self {
            View::Feature(v) => Some(v),
            _ => None,
        }
    }

    /// Content equivalence: two views of the same dataset state, regardless
    /// of when each instance was built.
    pub fn is_equivalent(&self, other: &View) -> bool {
        let (a, b) = (self.header(), other.header());
        a.key == b.key
            && a.generation == b.generation
            && a.version == b.version
            && self.kind() == other.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FeatureSet, GridResource};

    #[derive(Debug)]
    struct Both;

    impl Resource for Both {
        fn identifier(&self) -> Result<Option<String>, StoreError> {
            Ok(Some("both".to_string()))
        }

        fn as_grid(&self) -> Option<&dyn GridResource> {
            Some(self)
        }

        fn as_features(&self) -> Option<&dyn FeatureSet> {
            Some(self)
        }
    }

    impl GridResource for Both {
        fn grid_geometry(&self) -> Result<GridGeometry, StoreError> {
            Ok(GridGeometry {
                width: 2,
                height: 2,
                envelope: None,
            })
        }

        fn sample_dimensions(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec!["band_1".to_string()])
        }
    }

    impl FeatureSet for Both {
        fn feature_type(&self) -> Result<FeatureType, StoreError> {
            Ok(FeatureType {
                name: "both".to_string(),
                attributes: vec![],
                geometry_attribute: None,
            })
        }
    }

    #[derive(Debug)]
    struct Plain;

    impl Resource for Plain {
        fn identifier(&self) -> Result<Option<String>, StoreError> {
            Ok(Some("plain".to_string()))
        }
    }

    fn key(raw: &str) -> NameKey {
        NameKey::parse(raw).unwrap()
    }

    #[test]
    fn test_grid_capability_takes_precedence() {
        let generation = geodepot_core::new_generation();
        let view = View::build(key("a:both"), Arc::new(Both), generation, None).unwrap();
        assert_eq!(view.kind(), DatasetKind::Grid);
        assert_eq!(view.as_grid().unwrap().sample_dimensions(), ["band_1"]);
        assert!(view.as_feature().is_none());
    }

    #[test]
    fn test_plain_resource_is_opaque() {
        let generation = geodepot_core::new_generation();
        let view = View::build(key("plain"), Arc::new(Plain), generation, None).unwrap();
        assert_eq!(view.kind(), DatasetKind::Opaque);
        assert_eq!(view.key().as_str(), "plain");
    }

    #[test]
    fn test_equivalence_ignores_build_time() {
        let generation = geodepot_core::new_generation();
        let a = View::build(key("plain"), Arc::new(Plain), generation, None).unwrap();
        let b = View::build(key("plain"), Arc::new(Plain), generation, None).unwrap();
        assert!(a.is_equivalent(&b));

        let other_generation =
            View::build(key("plain"), Arc::new(Plain), geodepot_core::new_generation(), None)
                .unwrap();
        assert!(!a.is_equivalent(&other_generation));

        let versioned = View::build(
            key("plain"),
            Arc::new(Plain),
            generation,
            Some(chrono::Utc::now()),
        )
        .unwrap();
        assert!(!a.is_equivalent(&versioned));
    }
}
