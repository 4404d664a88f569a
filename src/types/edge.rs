//! Edge types for the collation graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::reading::ReadingId;
use super::sigil::Sigil;

/// Stable arena identifier of a sequence edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u32);

impl EdgeId {
    /// Create an edge id from its raw index.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw index.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Kind of directed edge between two readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Witness sequence: the target immediately follows the source.
    Sequence,
    /// Link in the lemma (edited text) thread. Carries no witnesses.
    LemmaText,
}

impl EdgeKind {
    /// Parse edge kind from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequence" => Some(Self::Sequence),
            "lemma_text" | "lemma" => Some(Self::LemmaText),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::LemmaText => write!(f, "lemma_text"),
        }
    }
}

/// Directed edge meaning "`to` immediately follows `from`" for its witnesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEdge {
    /// Arena identifier.
    pub id: EdgeId,
    /// Source reading.
    pub from: ReadingId,
    /// Target reading.
    pub to: ReadingId,
    /// Sequence or lemma-text link.
    pub kind: EdgeKind,
    /// Witnesses that read `from` then `to`.
    #[serde(default)]
    pub witnesses: BTreeSet<Sigil>,
    /// Free-form per-edge annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl SequenceEdge {
    /// Create an edge with no witnesses.
    pub fn new(id: EdgeId, from: ReadingId, to: ReadingId, kind: EdgeKind) -> Self {
        Self {
            id,
            from,
            to,
            kind,
            witnesses: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// True for witness sequence edges.
    pub fn is_sequence(&self) -> bool {
        self.kind == EdgeKind::Sequence
    }

    /// True if the exact sigil is carried by this edge.
    pub fn carries(&self, sigil: &Sigil) -> bool {
        self.witnesses.contains(sigil)
    }
}

/// Edge linking two readings considered variants of one another.
///
/// Stored directed, read undirected. Never participates in ranking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationEdge {
    /// Source reading.
    pub source: ReadingId,
    /// Target reading.
    pub target: ReadingId,
    /// Relation type, e.g. `orthographic` or `transposition`.
    pub relation_type: String,
}

impl RelationEdge {
    /// Create a new relation edge.
    pub fn new(source: ReadingId, target: ReadingId, relation_type: impl Into<String>) -> Self {
        Self {
            source,
            target,
            relation_type: relation_type.into(),
        }
    }

    /// True if the relation touches the reading at either end.
    pub fn touches(&self, reading: ReadingId) -> bool {
        self.source == reading || self.target == reading
    }
}
