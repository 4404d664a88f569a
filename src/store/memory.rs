//! In-memory graph store.
//!
//! Each tradition lives in a slot holding the committed graph behind an
//! `RwLock<Arc<_>>` and a writer mutex. A unit of work owns the writer
//! mutex guard for its whole lifetime, so writers on one tradition are
//! serialised while writers on different traditions proceed in parallel.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use tracing::debug;

use super::{GraphStore, UnitOfWork};
use crate::graph::CollationGraph;
use crate::types::TraditionId;

/// Error type for in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    /// Tradition not found.
    #[error("Tradition not found: {0}")]
    TraditionNotFound(TraditionId),
    /// Tradition was removed or replaced while the unit of work was open.
    #[error("Unit of work for tradition {0} is stale")]
    StaleUnit(TraditionId),
}

#[derive(Debug)]
struct TraditionSlot {
    committed: RwLock<Arc<CollationGraph>>,
    writer: Arc<Mutex<()>>,
}

impl TraditionSlot {
    fn new(graph: CollationGraph) -> Self {
        Self {
            committed: RwLock::new(Arc::new(graph)),
            writer: Arc::new(Mutex::new(())),
        }
    }
}

/// Open unit of work on an [`InMemoryGraphStore`].
pub struct InMemoryUnit {
    tradition: TraditionId,
    slot: Arc<TraditionSlot>,
    working: CollationGraph,
    _writer: ArcMutexGuard<RawMutex, ()>,
}

impl UnitOfWork for InMemoryUnit {
    fn tradition(&self) -> TraditionId {
        self.tradition
    }

    fn graph(&self) -> &CollationGraph {
        &self.working
    }

    fn graph_mut(&mut self) -> &mut CollationGraph {
        &mut self.working
    }
}

impl std::fmt::Debug for InMemoryUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryUnit")
            .field("tradition", &self.tradition)
            .field("readings", &self.working.num_readings())
            .finish()
    }
}

/// In-memory graph store.
///
/// Uses a BTreeMap for deterministic iteration over traditions.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    traditions: RwLock<BTreeMap<TraditionId, Arc<TraditionSlot>>>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a graph under a fresh tradition id.
    pub fn insert_tradition(&self, graph: CollationGraph) -> TraditionId {
        let id = TraditionId::random();
        self.insert_tradition_with_id(id, graph);
        id
    }

    /// Store (or replace) a graph under `id`.
    pub fn insert_tradition_with_id(&self, id: TraditionId, graph: CollationGraph) {
        self.traditions.write().insert(id, Arc::new(TraditionSlot::new(graph)));
    }

    /// Remove a tradition, returning its committed graph.
    pub fn remove_tradition(&self, id: TraditionId) -> Option<Arc<CollationGraph>> {
        let slot = self.traditions.write().remove(&id)?;
        let graph = slot.committed.read().clone();
        Some(graph)
    }

    /// Tradition ids in order.
    pub fn traditions(&self) -> Vec<TraditionId> {
        self.traditions.read().keys().copied().collect()
    }

    /// Number of stored traditions.
    pub fn num_traditions(&self) -> usize {
        self.traditions.read().len()
    }

    fn slot(&self, id: TraditionId) -> Result<Arc<TraditionSlot>, InMemoryError> {
        self.traditions
            .read()
            .get(&id)
            .cloned()
            .ok_or(InMemoryError::TraditionNotFound(id))
    }
}

impl GraphStore for InMemoryGraphStore {
    type Error = InMemoryError;
    type Unit = InMemoryUnit;

    fn snapshot(&self, tradition: TraditionId) -> Result<Arc<CollationGraph>, Self::Error> {
        let slot = self.slot(tradition)?;
        let graph = slot.committed.read().clone();
        Ok(graph)
    }

    fn begin_unit_of_work(&self, tradition: TraditionId) -> Result<Self::Unit, Self::Error> {
        let slot = self.slot(tradition)?;
        let writer = slot.writer.lock_arc();
        // Read after locking so the copy includes the previous writer's commit
        let working = CollationGraph::clone(&slot.committed.read());
        debug!(tradition = %tradition, "Began unit of work");
        Ok(InMemoryUnit {
            tradition,
            slot,
            working,
            _writer: writer,
        })
    }

    fn commit(&self, unit: Self::Unit) -> Result<(), Self::Error> {
        let current = self.slot(unit.tradition)?;
        if !Arc::ptr_eq(&current, &unit.slot) {
            return Err(InMemoryError::StaleUnit(unit.tradition));
        }
        *unit.slot.committed.write() = Arc::new(unit.working);
        debug!(tradition = %unit.tradition, "Committed unit of work");
        Ok(())
    }

    fn rollback(&self, unit: Self::Unit) {
        debug!(tradition = %unit.tradition, "Rolled back unit of work");
        drop(unit);
    }
}
