//! Error types for geodepot operations

use std::time::Duration;
use thiserror::Error;

/// Dataset name errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Dataset name has no segments: {raw:?}")]
    Empty { raw: String },

    #[error("Dataset name {raw:?} contains a blank segment")]
    BlankSegment { raw: String },
}

/// Backing store errors.
///
/// Reasons carry a description of the failure, never the store location
/// itself, so these values are safe to log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to open store: {reason}")]
    Open { reason: String },

    #[error("Failed to enumerate store resources: {reason}")]
    Enumerate { reason: String },

    #[error("Failed to read {name}: {reason}")]
    Read { name: String, reason: String },

    #[error("Failed to mutate {name}: {reason}")]
    Mutate { name: String, reason: String },

    #[error("Failed to close store: {reason}")]
    Close { reason: String },

    #[error("Store has already been closed")]
    Closed,

    #[error("Store does not support {operation}")]
    Unsupported { operation: String },

    #[error("Store has no resource named {name}")]
    NotFound { name: String },
}

/// Which kind of permit a timed-out acquisition was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentionKind {
    /// A read permit was refused because a write held on too long.
    ConcurrentWrite,
    /// A write permit was refused because readers held on too long.
    ConcurrentRead,
    /// A read permit could not be converted into a write permit.
    Upgrade,
}

impl ContentionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentionKind::ConcurrentWrite => "concurrent write",
            ContentionKind::ConcurrentRead => "concurrent read",
            ContentionKind::Upgrade => "upgrade",
        }
    }
}

impl std::fmt::Display for ContentionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Dataset not found: {name}")]
    NotFound { name: String },

    #[error("Lock contention ({kind}) after waiting {waited:?}")]
    Contention { kind: ContentionKind, waited: Duration },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to initialize tracing: {reason}")]
    Telemetry { reason: String },
}

/// Master error type for all geodepot errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoError {
    #[error("Name error: {0}")]
    Name(#[from] NameError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl GeoError {
    /// Contention is transient: a higher layer may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeoError::Access(AccessError::Contention { .. }))
    }

    /// NotFound is the soft miss that providers convert to an absent result.
    /// Invalid names can never resolve, so they count as misses too.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GeoError::Access(AccessError::NotFound { .. }) | GeoError::Name(_)
        )
    }

    /// Shorthand for building a NotFound access error.
    pub fn not_found(name: impl Into<String>) -> Self {
        GeoError::Access(AccessError::NotFound { name: name.into() })
    }
}

/// Result type alias for geodepot operations.
pub type GeoResult<T> = Result<T, GeoError>;

// =============================================================================
// TESTS
// =============================================================================
