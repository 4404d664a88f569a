//! Graph storage backends.
//!
//! A store holds one [`CollationGraph`] per tradition and hands out two
//! kinds of access:
//!
//! - snapshots for readers: an immutable `Arc` of the last committed graph,
//!   so readers never see a half-applied mutation
//! - units of work for writers: an exclusive working copy that becomes
//!   visible on [`commit`](GraphStore::commit) and vanishes on
//!   [`rollback`](GraphStore::rollback) or drop

pub mod memory;

use std::sync::Arc;

use crate::graph::{traversal, CollationGraph};
use crate::types::{ReadingId, TraditionId};

/// Exclusive working copy of one tradition's graph.
pub trait UnitOfWork {
    /// Tradition being modified.
    fn tradition(&self) -> TraditionId;

    /// The working graph.
    fn graph(&self) -> &CollationGraph;

    /// The working graph, mutably.
    fn graph_mut(&mut self) -> &mut CollationGraph;
}

/// Trait for graph storage backends.
///
/// Implementations must allow at most one open unit of work per tradition
/// and must keep snapshots stable while a unit of work is open.
pub trait GraphStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Unit of work handed to writers.
    type Unit: UnitOfWork;

    /// Last committed graph of a tradition.
    fn snapshot(&self, tradition: TraditionId) -> Result<Arc<CollationGraph>, Self::Error>;

    /// Open an exclusive unit of work, waiting for any other writer.
    fn begin_unit_of_work(&self, tradition: TraditionId) -> Result<Self::Unit, Self::Error>;

    /// Publish the unit's working graph.
    fn commit(&self, unit: Self::Unit) -> Result<(), Self::Error>;

    /// Discard the unit's working graph.
    fn rollback(&self, unit: Self::Unit);

    /// Readings reachable from `start` in the committed graph, each once.
    fn traverse_from(&self, tradition: TraditionId, start: ReadingId) -> Result<Vec<ReadingId>, Self::Error> {
        let graph = self.snapshot(tradition)?;
        Ok(traversal::traverse_from(&graph, start))
    }
}

pub use memory::{InMemoryError, InMemoryGraphStore, InMemoryUnit};
