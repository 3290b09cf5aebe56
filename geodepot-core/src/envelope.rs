//! Spatial envelopes and coordinate reference system identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coordinate reference system identifier, e.g. `EPSG:4326`.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrsId(String);

impl CrsId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Authority part of the code (`EPSG` in `EPSG:4326`), if present.
    pub fn authority(&self) -> Option<&str> {
        self.0.split_once(':').map(|(authority, _)| authority)
    }

    /// Code part (`4326` in `EPSG:4326`), or the whole identifier.
    pub fn code(&self) -> &str {
        self.0
            .split_once(':')
            .map(|(_, code)| code)
            .unwrap_or(&self.0)
    }
}

/// Authorities are case-insensitive, codes are not.
impl PartialEq for CrsId {
    fn eq(&self, other: &Self) -> bool {
        match (self.authority(), other.authority()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b) && self.code() == other.code(),
            (None, None) => self.0 == other.0,
            _ => false,
        }
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Envelope construction and combination errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("Envelope bounds are not finite")]
    NotFinite,

    #[error("Envelope minimum exceeds maximum on {axis} axis")]
    Inverted { axis: &'static str },

    #[error("Cannot combine envelopes in {left} and {right}")]
    CrsMismatch { left: String, right: String },
}

/// Axis-aligned 2D bounding box, optionally tagged with its CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub crs: Option<CrsId>,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(
        crs: Option<CrsId>,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Result<Self, EnvelopeError> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(EnvelopeError::NotFinite);
        }
        if min_x > max_x {
            return Err(EnvelopeError::Inverted { axis: "x" });
        }
        if min_y > max_y {
            return Err(EnvelopeError::Inverted { axis: "y" });
        }
        Ok(Self {
            crs,
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Smallest envelope covering both inputs.
    ///
    /// An untagged envelope adopts the CRS of the other side; two different
    /// CRS cannot be combined without reprojection.
    pub fn union(&self, other: &Envelope) -> Result<Envelope, EnvelopeError> {
        let crs = match (&self.crs, &other.crs) {
            (Some(a), Some(b)) if a != b => {
                return Err(EnvelopeError::CrsMismatch {
                    left: a.to_string(),
                    right: b.to_string(),
                })
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        Ok(Envelope {
            crs,
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        })
    }
}
