//! # collation-graph
//!
//! Rank-ordered collation graphs for textual traditions.
//!
//! A collation graph records how several witnesses (copies) of one text
//! line up, reading by reading. Each witness is a simple path of sequence
//! edges from a section's start reading to its end reading, and every
//! reading carries a rank: the column it occupies in the alignment.
//!
//! ## Core Contract
//!
//! 1. Ranks are longest-path labels: `rank(start) = 0` and every other
//!    reading sits one past its furthest predecessor
//! 2. Sections can be split at a rank and merged back without breaking any
//!    witness path
//! 3. Readings that could be (or already are) the same word are detected
//!    without creating cycles
//! 4. Any run of sections flattens to a witness × position table
//!
//! ## Architecture
//!
//! ```text
//! Importer → CollationGraph → GraphStore (unit of work / snapshots)
//!                  ↓                  ↓
//!            rank · splice      Collator ──→ duplicates · flatten
//!                  ↓
//!             invariants
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Arena ids are handed out monotonically and never reused
//! - Adjacency is id-ordered, so traversal order depends only on the graph
//! - Flattening an unchanged graph yields byte-identical tables

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod graph;
pub mod rank;
pub mod splice;
pub mod duplicates;
pub mod flatten;
pub mod invariants;
pub mod normalize;
pub mod canonical;
pub mod store;
pub mod collator;
pub mod config;
pub mod error;

// Re-exports
pub use types::{
    EdgeId, EdgeKind, Rank, Reading, ReadingId, RelationEdge, SectionId, SectionInfo,
    SequenceEdge, Sigil, SigilParseError, TraditionId,
};
pub use graph::{CollationGraph, GraphData};
pub use graph::traversal::{
    is_reachable, readings_between_ranks, section_readings, section_relations, traverse_from,
    witness_path, witnesses_of_section,
};
pub use rank::{assign_ranks, parse_rank, recalculate_rank, recalculate_ranks_from, RankReport};
pub use splice::{delete_section, merge_sections, reorder_after, split_section};
pub use duplicates::{candidate_pairs, identical_readings, IdenticalGroup, ReadingPair};
pub use flatten::{
    flatten, section_table, AlignmentTable, Cell, Column, FlattenOptions, LayerPolicy,
    SectionTable, Token,
};
pub use invariants::{check_section, check_tradition};
pub use store::{GraphStore, InMemoryGraphStore, UnitOfWork};
pub use collator::Collator;
pub use config::CollatorConfig;
pub use error::{CollationError, ErrorKind, Result};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Schema version of the serialised graph and table formats.
/// Increment on breaking changes to any serialised type.
pub const COLLATION_SCHEMA_VERSION: &str = "1.0.0";
