//! Descriptive types returned by providers.

use crate::{CrsId, Envelope, NameKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// DATASET KIND
// ============================================================================

/// Capability variant a dataset view was built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Gridded coverage (raster).
    Grid,
    /// Tabular feature collection.
    Feature,
    /// Anything else the store exposes.
    Opaque,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Grid => "grid",
            DatasetKind::Feature => "feature",
            DatasetKind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an invalid dataset kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetKindParseError(pub String);

impl fmt::Display for DatasetKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid dataset kind: {}", self.0)
    }
}

impl std::error::Error for DatasetKindParseError {}

impl FromStr for DatasetKind {
    type Err = DatasetKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "grid" | "coverage" => Ok(DatasetKind::Grid),
            "feature" | "vector" => Ok(DatasetKind::Feature),
            "opaque" => Ok(DatasetKind::Opaque),
            _ => Err(DatasetKindParseError(s.to_string())),
        }
    }
}

// ============================================================================
// STORE AND PROVIDER METADATA
// ============================================================================

/// Metadata a store reports about itself, when it can.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub title: Option<String>,
    pub envelope: Option<Envelope>,
    pub crs: Option<CrsId>,
    #[serde(default)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl StoreMetadata {
    /// True when the store supplied nothing a description can use.
    pub fn is_empty(&self) -> bool {
        self.envelope.is_none() && self.crs.is_none()
    }
}

/// Where a provider description came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    /// Reported by the store itself.
    Native,
    /// Aggregated from per-dataset envelopes.
    Scanned,
    /// Neither the store nor any dataset reported an extent.
    Unavailable,
}

/// Aggregate description of a provider's current resource set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescription {
    pub provider_id: String,
    /// Identity of the resource set this description was computed from.
    pub generation: Uuid,
    pub dataset_count: usize,
    pub title: Option<String>,
    pub envelope: Option<Envelope>,
    pub crs: Option<CrsId>,
    pub source: MetadataSource,
    pub described_at: Timestamp,
}

// ============================================================================
// BULK OPERATION REPORTS
// ============================================================================

/// A dataset a bulk operation had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a best-effort bulk removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub removed: Vec<NameKey>,
    pub skipped: Vec<PartialFailure>,
    /// Whether store-level structure (e.g. a backing schema) was dropped.
    pub purged: bool,
}

impl RemovalReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_kind_roundtrip() {
        for kind in [DatasetKind::Grid, DatasetKind::Feature, DatasetKind::Opaque] {
            assert_eq!(kind.as_str().parse::<DatasetKind>().unwrap(), kind);
        }
        assert_eq!("Coverage".parse::<DatasetKind>().unwrap(), DatasetKind::Grid);
        assert!("sensor".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_store_metadata_is_empty() {
        let mut metadata = StoreMetadata {
            title: Some("roads".to_string()),
            ..Default::default()
        };
        assert!(metadata.is_empty());
        metadata.crs = Some(CrsId::new("EPSG:4326"));
        assert!(!metadata.is_empty());
    }

    #[test]
    fn test_removal_report_completeness() {
        let mut report = RemovalReport::default();
        assert!(report.is_complete());
        report.skipped.push(PartialFailure {
            name: "a:b".to_string(),
            reason: "locked".to_string(),
        });
        assert!(!report.is_complete());
    }

    #[test]
    fn test_metadata_source_serializes_lowercase() {
        let json = serde_json::to_string(&MetadataSource::Scanned).unwrap();
        assert_eq!(json, "\"scanned\"");
    }
}
