//! Error types for collation graph operations.

use crate::types::{Rank, ReadingId, SectionId, Sigil};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollationError>;

/// Coarse classification of a [`CollationError`].
///
/// A service layer maps these onto status codes; the variants of
/// `CollationError` carry the detail for the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown section, reading, witness or rank.
    NotFound,
    /// A cycle exists or would be created.
    CyclicGraph,
    /// Merge requested on sections that are not neighbours.
    NotAdjacent,
    /// Post-mutation consistency check failed.
    InvariantViolation,
    /// Malformed caller input.
    InvalidInput,
    /// Storage backend failure.
    Store,
}

/// Error type for collation graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollationError {
    /// Section is not part of the tradition.
    #[error("Section not found: {0}")]
    SectionNotFound(SectionId),
    /// Reading is not in the graph.
    #[error("Reading not found: {0}")]
    ReadingNotFound(ReadingId),
    /// Section has no start reading.
    #[error("Section {0} has no start reading")]
    MissingStart(SectionId),
    /// Section has no end reading.
    #[error("Section {0} has no end reading")]
    MissingEnd(SectionId),
    /// Witness does not occur in the section.
    #[error("Witness {sigil} not found in section {section}")]
    WitnessNotFound {
        /// Section searched.
        section: SectionId,
        /// Requested witness.
        sigil: Sigil,
    },
    /// No reading of the section sits at the requested rank.
    #[error("Rank {rank} not found within section {section}")]
    RankNotFound {
        /// Section searched.
        section: SectionId,
        /// Requested rank.
        rank: Rank,
    },
    /// A reading is reachable from itself.
    #[error("Cycle detected in sequence graph at reading {reading}")]
    CyclicGraph {
        /// A reading on the cycle.
        reading: ReadingId,
    },
    /// `second` does not directly follow `first` in the section order.
    #[error("Sections {first} and {second} are not adjacent")]
    NotAdjacent {
        /// Section that should come first.
        first: SectionId,
        /// Section that should follow it.
        second: SectionId,
    },
    /// Internal consistency check failed after a mutation.
    #[error("Invariant violated{}: {detail}", .section.map(|s| format!(" in section {s}")).unwrap_or_default())]
    InvariantViolation {
        /// Offending section, if the check was section-scoped.
        section: Option<SectionId>,
        /// What was inconsistent.
        detail: String,
    },
    /// Caller-supplied rank could not be parsed.
    #[error("Invalid rank: {0:?}")]
    InvalidRank(String),
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl CollationError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Create a section-scoped invariant violation.
    pub fn invariant(section: SectionId, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            section: Some(section),
            detail: detail.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SectionNotFound(_)
            | Self::ReadingNotFound(_)
            | Self::MissingStart(_)
            | Self::MissingEnd(_)
            | Self::WitnessNotFound { .. }
            | Self::RankNotFound { .. } => ErrorKind::NotFound,
            Self::CyclicGraph { .. } => ErrorKind::CyclicGraph,
            Self::NotAdjacent { .. } => ErrorKind::NotAdjacent,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::InvalidRank(_) => ErrorKind::InvalidInput,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// True for every flavour of not-found.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(CollationError::SectionNotFound(SectionId::new(1)).kind(), ErrorKind::NotFound);
        assert!(CollationError::RankNotFound { section: SectionId::new(1), rank: 4 }.is_not_found());
        assert_eq!(
            CollationError::NotAdjacent { first: SectionId::new(1), second: SectionId::new(3) }.kind(),
            ErrorKind::NotAdjacent
        );
        assert_eq!(CollationError::InvalidRank("x".into()).kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_messages_carry_context() {
        let err = CollationError::RankNotFound { section: SectionId::new(2), rank: 9 };
        assert_eq!(err.to_string(), "Rank 9 not found within section s2");

        let err = CollationError::invariant(SectionId::new(4), "witness A branches");
        assert_eq!(err.to_string(), "Invariant violated in section s4: witness A branches");

        let err = CollationError::InvariantViolation { section: None, detail: "order".into() };
        assert_eq!(err.to_string(), "Invariant violated: order");
    }
}
