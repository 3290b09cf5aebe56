//! Canonical dataset names.
//!
//! Stores emit dataset names in several shapes: `ns:layer`, `ns/layer`,
//! `ns::layer`, or just `layer`. [`NameKey`] reduces all of them to one
//! comparison key by splitting on every admissible separator, dropping empty
//! segments and rejoining with [`NameKey::SEPARATOR`]. Segment order and case
//! are preserved.

use crate::NameError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separators accepted when parsing a raw name.
const ADMISSIBLE_SEPARATORS: [char; 2] = [':', '/'];

/// Canonical, normalized dataset name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameKey {
    canonical: String,
}

impl NameKey {
    /// Separator used in the canonical form.
    pub const SEPARATOR: char = ':';

    /// Normalize a raw name.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let segments: Vec<&str> = raw
            .split(&ADMISSIBLE_SEPARATORS[..])
            .filter(|segment| !segment.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(NameError::Empty {
                raw: raw.to_string(),
            });
        }
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(NameError::BlankSegment {
                raw: raw.to_string(),
            });
        }

        let mut canonical = String::with_capacity(raw.len());
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                canonical.push(Self::SEPARATOR);
            }
            canonical.push_str(segment);
        }
        Ok(Self { canonical })
    }

    /// The canonical text.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Segments in order, outermost scope first.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.canonical.split(Self::SEPARATOR)
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The last segment (the local part of a qualified name).
    pub fn tip(&self) -> &str {
        self.canonical
            .rsplit(Self::SEPARATOR)
            .next()
            .unwrap_or(&self.canonical)
    }

    /// True when the name carries at least one scope segment.
    pub fn is_qualified(&self) -> bool {
        self.canonical.contains(Self::SEPARATOR)
    }

    /// True when every segment of `self` matches the trailing segments of
    /// `other`, e.g. `b` and `a:b` are suffixes of `x:a:b`.
    pub fn is_suffix_of(&self, other: &NameKey) -> bool {
        if self.depth() > other.depth() {
            return false;
        }
        self.segments()
            .rev()
            .zip(other.segments().rev())
            .all(|(a, b)| a == b)
    }
}

impl fmt::Display for NameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for NameKey {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for NameKey {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

impl Serialize for NameKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl<'de> Deserialize<'de> for NameKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NameKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_separators() {
        let colon = NameKey::parse("roads:segments").unwrap();
        let slash = NameKey::parse("roads/segments").unwrap();
        let doubled = NameKey::parse("roads::segments").unwrap();
        assert_eq!(colon, slash);
        assert_eq!(colon, doubled);
        assert_eq!(colon.as_str(), "roads:segments");
    }

    #[test]
    fn test_parse_drops_leading_and_trailing_separators() {
        let key = NameKey::parse("/a:b/").unwrap();
        assert_eq!(key.as_str(), "a:b");
    }

    #[test]
    fn test_parse_preserves_case_and_order() {
        let key = NameKey::parse("Ns/Layer").unwrap();
        assert_eq!(key.as_str(), "Ns:Layer");
        assert_ne!(key, NameKey::parse("ns:layer").unwrap());
        assert_ne!(key, NameKey::parse("Layer:Ns").unwrap());
    }

    #[test]
    fn test_parse_keeps_dots_inside_segments() {
        let key = NameKey::parse("files/roads.shp").unwrap();
        assert_eq!(key.tip(), "roads.shp");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(NameKey::parse(""), Err(NameError::Empty { .. })));
        assert!(matches!(NameKey::parse(":/:"), Err(NameError::Empty { .. })));
        assert!(matches!(
            NameKey::parse("a: :b"),
            Err(NameError::BlankSegment { .. })
        ));
    }

    #[test]
    fn test_tip_and_qualification() {
        let qualified = NameKey::parse("a:b:c").unwrap();
        assert_eq!(qualified.tip(), "c");
        assert_eq!(qualified.depth(), 3);
        assert!(qualified.is_qualified());

        let local = NameKey::parse("c").unwrap();
        assert_eq!(local.tip(), "c");
        assert!(!local.is_qualified());
    }

    #[test]
    fn test_is_suffix_of() {
        let full = NameKey::parse("x:a:b").unwrap();
        assert!(NameKey::parse("b").unwrap().is_suffix_of(&full));
        assert!(NameKey::parse("a:b").unwrap().is_suffix_of(&full));
        assert!(full.is_suffix_of(&full));
        assert!(!NameKey::parse("y:b").unwrap().is_suffix_of(&full));
        assert!(!full.is_suffix_of(&NameKey::parse("a:b").unwrap()));
    }

    #[test]
    fn test_serde_renormalizes() {
        let key: NameKey = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(key.as_str(), "a:b");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"a:b\"");
    }
}
