//! geodepot Test Utilities
//!
//! Centralized test infrastructure for the geodepot workspace:
//! - Proptest generators for names, envelopes and store layouts
//! - Counting store suppliers and scenario fixtures
//! - Custom assertions for geodepot-specific validation

// Re-export the in-memory store from its source crate
pub use geodepot_storage::{MemoryResource, MemoryStore, Provider, RemovalMode, View};

// Re-export core types for convenience
pub use geodepot_core::{
    AccessError, CrsId, DatasetKind, Envelope, GeoError, GeoResult, NameKey, ProviderConfig,
    StoreError, StoreMetadata, Timestamp, Version,
};

use geodepot_storage::{Store, StoreSupplier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// COUNTING SUPPLIER
// ============================================================================

/// Store supplier that opens a fresh [`MemoryStore`] from a shared,
/// mutable list of dataset names and counts opens and closes.
///
/// Clones share their counters and names, so a test can keep one clone
/// while the provider owns another.
#[derive(Debug, Clone)]
pub struct CountingSupplier {
    names: Arc<Mutex<Vec<String>>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    removal: RemovalMode,
    versioned: bool,
}

impl CountingSupplier {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(Mutex::new(names.into_iter().map(Into::into).collect())),
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            removal: RemovalMode::Unsupported,
            versioned: false,
        }
    }

    pub fn with_removal(mut self, removal: RemovalMode) -> Self {
        self.removal = removal;
        self
    }

    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    /// Replace the datasets the next opened store will expose.
    pub fn set_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.names.lock().unwrap_or_else(PoisonError::into_inner) =
            names.into_iter().map(Into::into).collect();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl StoreSupplier for CountingSupplier {
    fn open(&self, _config: &ProviderConfig) -> Result<Box<dyn Store>, StoreError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let names = self.names.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut store = MemoryStore::with_features("memory", names)
            .with_removal(self.removal)
            .with_close_counter(Arc::clone(&self.closes));
        if self.versioned {
            store = store.versioned();
        }
        Ok(Box::new(store))
    }

    fn describe(&self) -> String {
        "counting in-memory supplier".to_string()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for geodepot types.

    use super::*;
    use proptest::prelude::*;

    /// One non-empty name segment without separators.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_.-]{1,8}"
    }

    /// One admissible separator.
    pub fn arb_separator() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just(":"), Just("/"), Just("::"), Just("//")]
    }

    /// Segments of a name, outermost first.
    pub fn arb_segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_segment(), 1..4)
    }

    /// A raw name: segments joined by arbitrary separators, sometimes with a
    /// leading or trailing separator.
    pub fn arb_raw_name() -> impl Strategy<Value = String> {
        (arb_segments(), prop::collection::vec(arb_separator(), 4), any::<(bool, bool)>()).prop_map(
            |(segments, separators, (leading, trailing))| {
                let mut raw = String::new();
                if leading {
                    raw.push('/');
                }
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        raw.push_str(separators[i % separators.len()]);
                    }
                    raw.push_str(segment);
                }
                if trailing {
                    raw.push(':');
                }
                raw
            },
        )
    }

    pub fn arb_name_key() -> impl Strategy<Value = NameKey> {
        arb_segments().prop_map(|segments| {
            NameKey::parse(&segments.join(":")).unwrap_or_else(|e| panic!("generated invalid name: {e}"))
        })
    }

    /// Names that must be rejected.
    pub fn arb_invalid_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[:/]{1,6}",
            arb_segment().prop_map(|s| format!("{s}: :x")),
        ]
    }

    /// Distinct dataset names (by canonical key), in discovery order.
    pub fn arb_store_layout() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_segments(), 0..8).prop_map(|names| {
            let mut seen = std::collections::HashSet::new();
            names
                .into_iter()
                .map(|segments| segments.join(":"))
                .filter(|name| seen.insert(name.clone()))
                .collect()
        })
    }

    pub fn arb_crs() -> impl Strategy<Value = CrsId> {
        prop_oneof![
            Just(CrsId::new("EPSG:4326")),
            Just(CrsId::new("EPSG:3857")),
            Just(CrsId::new("EPSG:2154")),
        ]
    }

    /// A valid envelope in the given CRS.
    pub fn arb_envelope_in(crs: CrsId) -> impl Strategy<Value = Envelope> {
        (-180.0f64..180.0, -90.0f64..90.0, 0.0f64..50.0, 0.0f64..50.0).prop_map(
            move |(x, y, w, h)| {
                Envelope::new(Some(crs.clone()), x, y, x + w, y + h)
                    .unwrap_or_else(|e| panic!("generated invalid envelope: {e}"))
            },
        )
    }

    pub fn arb_envelope() -> impl Strategy<Value = Envelope> {
        arb_crs().prop_flat_map(arb_envelope_in)
    }

    /// A dataset version between 2020 and 2030.
    pub fn arb_version() -> impl Strategy<Value = Version> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_dataset_kind() -> impl Strategy<Value = DatasetKind> {
        prop_oneof![
            Just(DatasetKind::Grid),
            Just(DatasetKind::Feature),
            Just(DatasetKind::Opaque),
        ]
    }

    /// A resource of any kind with the given name.
    pub fn arb_resource(name: String) -> impl Strategy<Value = MemoryResource> {
        (arb_dataset_kind(), prop::option::of(arb_envelope_in(CrsId::new("EPSG:4326")))).prop_map(
            move |(kind, envelope)| {
                let resource = match kind {
                    DatasetKind::Grid => MemoryResource::grid(name.clone()),
                    DatasetKind::Feature => MemoryResource::feature(name.clone()),
                    DatasetKind::Opaque => MemoryResource::opaque(name.clone()),
                };
                match envelope {
                    Some(envelope) => resource.with_envelope(envelope),
                    None => resource,
                }
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;

    /// A provider config for in-memory stores.
    pub fn test_config(id: &str) -> ProviderConfig {
        ProviderConfig::new(id, "memory")
    }

    /// A provider over a fresh [`MemoryStore`] built on every open.
    pub fn provider_over(build: impl Fn() -> MemoryStore + Send + Sync + 'static) -> Provider {
        let supplier = move |_: &ProviderConfig| -> Result<Box<dyn Store>, StoreError> { Ok(Box::new(build())) };
        Provider::new(test_config("fixture"), supplier)
            .unwrap_or_else(|e| panic!("fixture provider rejected: {e}"))
    }

    /// A provider over a [`CountingSupplier`]; the returned clone observes it.
    pub fn counting_provider(supplier: CountingSupplier) -> (Provider, CountingSupplier) {
        let observer = supplier.clone();
        let provider = Provider::new(test_config("counting"), supplier)
            .unwrap_or_else(|e| panic!("fixture provider rejected: {e}"));
        (provider, observer)
    }

    /// Datasets `a:b` and `a:c` in a read-only store.
    pub fn qualified_store() -> MemoryStore {
        MemoryStore::with_features("memory", ["a:b", "a:c"])
    }

    /// Two datasets sharing the tip `b` in different scopes.
    pub fn ambiguous_store() -> MemoryStore {
        MemoryStore::with_features("memory", ["a:b", "x:b"])
    }

    /// A mutable tabular store with a purgeable schema.
    pub fn mutable_store(names: &[&str]) -> MemoryStore {
        MemoryStore::with_features("memory", names.iter().copied())
            .with_removal(RemovalMode::DeleteByName)
            .purgeable()
    }

    pub fn wgs84_envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Envelope {
        Envelope::new(Some(CrsId::new("EPSG:4326")), min_x, min_y, max_x, max_y)
            .unwrap_or_else(|e| panic!("invalid fixture envelope: {e}"))
    }

    /// Store metadata as a catalogued store would report it.
    pub fn native_metadata(title: &str, envelope: Envelope) -> StoreMetadata {
        let mut extras = serde_json::Map::new();
        extras.insert("source".to_string(), serde_json::json!("fixture"));
        StoreMetadata {
            title: Some(title.to_string()),
            crs: envelope.crs.clone(),
            envelope: Some(envelope),
            extras,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for geodepot-specific validation.

    use super::*;
    use geodepot_storage::AccessGuard;

    /// Assert that keys match the expected canonical names, in order.
    #[track_caller]
    pub fn assert_keys_eq(keys: &[NameKey], expected: &[&str]) {
        let actual: Vec<&str> = keys.iter().map(NameKey::as_str).collect();
        assert_eq!(actual, expected, "Dataset keys differ");
    }

    /// Assert that a GeoResult is a NotFound access error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &GeoResult<T>) {
        match result {
            Err(GeoError::Access(AccessError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a GeoResult is a retryable contention error.
    #[track_caller]
    pub fn assert_contention<T: std::fmt::Debug>(result: &GeoResult<T>) {
        match result {
            Err(e @ GeoError::Access(AccessError::Contention { .. })) => {
                assert!(e.is_retryable(), "Contention must be retryable");
            }
            other => panic!("Expected Contention error, got: {:?}", other),
        }
    }

    /// Assert that a GeoResult is a Store error.
    #[track_caller]
    pub fn assert_store_error<T: std::fmt::Debug>(result: &GeoResult<T>) {
        match result {
            Err(GeoError::Store(_)) => {}
            other => panic!("Expected Store error, got: {:?}", other),
        }
    }

    /// Assert that a GeoResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &GeoResult<T>) {
        match result {
            Err(GeoError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert two views show the same dataset state.
    #[track_caller]
    pub fn assert_equivalent_views(a: &View, b: &View) {
        assert!(
            a.is_equivalent(b),
            "Views differ: {:?} vs {:?}",
            a.header(),
            b.header()
        );
    }

    /// Assert the guard has no outstanding or pending permits.
    #[track_caller]
    pub fn assert_idle(guard: &AccessGuard) {
        let snapshot = guard.snapshot();
        assert_eq!(snapshot.readers, 0, "Readers still hold permits");
        assert!(!snapshot.writer, "Writer still holds its permit");
        assert!(!snapshot.upgrading, "Upgrade slot still claimed");
        assert_eq!(snapshot.writers_waiting, 0, "Writers still queued");
    }
}

// ============================================================================
// TESTS
// ============================================================================
