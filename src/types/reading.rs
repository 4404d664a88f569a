//! Reading and identifier types for the collation graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Canonical column index of a reading.
pub type Rank = u32;

/// Stable arena identifier of a reading.
///
/// Identifiers are handed out monotonically by the owning
/// [`CollationGraph`](crate::graph::CollationGraph) and never reused, so a
/// stale id can only miss on lookup, never alias another reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(u32);

impl ReadingId {
    /// Create a reading id from its raw index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw index.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Stable identifier of a section within a tradition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(u32);

impl SectionId {
    /// Create a section id from its raw index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw index.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identifier of a tradition held by a [`GraphStore`](crate::store::GraphStore).
///
/// Wraps a UUID and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraditionId(Uuid);

impl TraditionId {
    /// Create a new TraditionId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random TraditionId.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TraditionId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TraditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TraditionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A token or word occurrence in the collated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Arena identifier.
    pub id: ReadingId,
    /// Section this reading currently belongs to.
    pub section: SectionId,
    /// Display text.
    pub text: String,
    /// Optional normalised / canonical form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_form: Option<String>,
    /// Column index; `None` until the rank engine has labelled it.
    #[serde(default)]
    pub rank: Option<Rank>,
    /// Section start marker.
    #[serde(default)]
    pub is_start: bool,
    /// Section end marker.
    #[serde(default)]
    pub is_end: bool,
    /// Transitional boundary marker used while merging sections.
    #[serde(default)]
    pub is_placeholder: bool,
}

impl Reading {
    /// Create an ordinary text reading.
    pub fn new(id: ReadingId, section: SectionId, text: impl Into<String>, rank: Option<Rank>) -> Self {
        Self {
            id,
            section,
            text: text.into(),
            normal_form: None,
            rank,
            is_start: false,
            is_end: false,
            is_placeholder: false,
        }
    }

    /// Create a section start marker at rank 0.
    pub fn start(id: ReadingId, section: SectionId) -> Self {
        Self {
            is_start: true,
            ..Self::new(id, section, "#START#", Some(0))
        }
    }

    /// Create a section end marker.
    pub fn end(id: ReadingId, section: SectionId, rank: Option<Rank>) -> Self {
        Self {
            is_end: true,
            ..Self::new(id, section, "#END#", rank)
        }
    }

    /// Set the normal form.
    pub fn with_normal_form(mut self, normal_form: impl Into<String>) -> Self {
        self.normal_form = Some(normal_form.into());
        self
    }

    /// True for start, end and placeholder markers, which carry no text.
    pub fn is_boundary(&self) -> bool {
        self.is_start || self.is_end || self.is_placeholder
    }

    /// The normal form if present, else the display text.
    pub fn normalized(&self) -> &str {
        self.normal_form.as_deref().unwrap_or(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_id_ordering() {
        assert!(ReadingId::new(1) < ReadingId::new(2));
        assert_eq!(ReadingId::new(7).to_string(), "r7");
    }

    #[test]
    fn test_boundary_flags() {
        let section = SectionId::new(0);
        let start = Reading::start(ReadingId::new(0), section);
        let end = Reading::end(ReadingId::new(1), section, None);
        let word = Reading::new(ReadingId::new(2), section, "cat", Some(1));

        assert!(start.is_boundary());
        assert_eq!(start.rank, Some(0));
        assert!(end.is_boundary());
        assert!(!word.is_boundary());
    }

    #[test]
    fn test_normalized_falls_back_to_text() {
        let section = SectionId::new(0);
        let plain = Reading::new(ReadingId::new(2), section, "Cat", Some(1));
        let normal = plain.clone().with_normal_form("cat");

        assert_eq!(plain.normalized(), "Cat");
        assert_eq!(normal.normalized(), "cat");
    }

    #[test]
    fn test_tradition_id_parse() {
        let id = TraditionId::parse("00000000-0000-0000-0000-000000000001").unwrap();
        assert_eq!(id.as_uuid(), Uuid::from_u128(1));
        assert!(TraditionId::parse("not-a-uuid").is_err());
    }
}
