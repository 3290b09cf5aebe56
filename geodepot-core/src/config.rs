//! Configuration loading for providers and the access layer.
//!
//! Provider configuration is opaque to the access layer except for its
//! identity and lock timeout; everything else is handed to the store
//! supplier untouched.

use crate::ConfigError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`AccessConfig::lock_timeout_ms`].
pub const LOCK_TIMEOUT_ENV: &str = "GEODEPOT_LOCK_TIMEOUT_MS";

/// Default bound on session acquisition.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

// ============================================================================
// ACCESS CONFIGURATION
// ============================================================================

/// Access-layer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// How long session acquisition may block before failing with contention.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl AccessConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: AccessConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup(LOCK_TIMEOUT_ENV) {
            self.lock_timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: LOCK_TIMEOUT_ENV.to_string(),
                reason: format!("not a number of milliseconds: {raw:?}"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock_timeout_ms".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Configuration of one provider.
///
/// `location` usually embeds credentials (JDBC-style URLs, signed object
/// store paths) and is therefore kept behind [`SecretString`]; `Debug`
/// output and logs only ever see [`ProviderConfig::redacted_location`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub id: String,
    /// Store factory selector, e.g. `shapefile`, `geotiff`, `postgis`.
    pub kind: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub location: Option<SecretString>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub access: AccessConfig,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|value| SecretString::new(value.into_boxed_str())))
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            location: None,
            parameters: BTreeMap::new(),
            access: AccessConfig::default(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        let location: String = location.into();
        self.location = Some(SecretString::new(location.into_boxed_str()));
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_access(mut self, access: AccessConfig) -> Self {
        self.access = access;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ProviderConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.kind.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "kind".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.access.validate()
    }

    /// The raw location, for store suppliers only.
    pub fn expose_location(&self) -> Option<&str> {
        self.location.as_ref().map(|secret| secret.expose_secret())
    }

    /// A loggable stand-in for the location: the scheme, never the rest.
    pub fn redacted_location(&self) -> String {
        match self.expose_location() {
            None => "<unset>".to_string(),
            Some(location) => match location.split_once("://") {
                Some((scheme, _)) => format!("{scheme}://***"),
                None => "***".to_string(),
            },
        }
    }
}
