//! geodepot Core - Data Types
//!
//! Pure data structures shared by the access layer and its callers:
//! canonical dataset names, envelopes, descriptive metadata, errors and
//! configuration. No locking and no store I/O lives here.

pub mod config;
pub mod envelope;
pub mod error;
pub mod health;
pub mod metadata;
pub mod name;
pub mod telemetry;

pub use config::{AccessConfig, ProviderConfig, DEFAULT_LOCK_TIMEOUT_MS, LOCK_TIMEOUT_ENV};
pub use envelope::{CrsId, Envelope, EnvelopeError};
pub use error::{
    AccessError, ConfigError, ContentionKind, GeoError, GeoResult, NameError, StoreError,
};
pub use health::{HealthCheck, HealthStatus};
pub use metadata::{
    DatasetKind, MetadataSource, PartialFailure, ProviderDescription, RemovalReport, StoreMetadata,
};
pub use name::NameKey;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

use chrono::{DateTime, Utc};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Temporal version of a dataset. Stores that keep history resolve a
/// versioned read to the state that was current at this instant.
pub type Version = Timestamp;

/// Identity of one materialized resource set (UUIDv7, sortable by open time).
pub type Generation = uuid::Uuid;

/// Generate a new resource set generation.
pub fn new_generation() -> Generation {
    uuid::Uuid::now_v7()
}
