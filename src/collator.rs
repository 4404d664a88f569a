//! Transactional façade over a [`GraphStore`].
//!
//! The collator runs every operation against one tradition held by the
//! store. Readers work on a committed snapshot; writers work on a unit of
//! work that is committed only if the operation and the invariant check of
//! every touched section succeed.
//!
//! ## Mutating operations
//!
//! 1. Open a unit of work (waits for any other writer on the tradition)
//! 2. Apply the operation to the working copy
//! 3. If `verify_invariants` is set, check every section the operation
//!    touched
//! 4. Commit, or roll back on the first error

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CollatorConfig;
use crate::duplicates::{self, IdenticalGroup, ReadingPair};
use crate::error::{CollationError, Result};
use crate::flatten::{self, AlignmentTable, FlattenOptions};
use crate::graph::{traversal, CollationGraph};
use crate::invariants;
use crate::rank::{self, RankReport};
use crate::splice;
use crate::store::{GraphStore, UnitOfWork};
use crate::types::{Rank, Reading, ReadingId, RelationEdge, SectionId, SectionInfo, Sigil, TraditionId};

/// Collation operations over a graph store.
pub struct Collator<S: GraphStore> {
    store: Arc<S>,
    config: CollatorConfig,
}

impl<S: GraphStore> Collator<S> {
    /// Create a collator over `store`.
    pub fn new(store: Arc<S>, config: CollatorConfig) -> Self {
        Self { store, config }
    }

    /// Create a collator with configuration from the environment.
    pub fn from_env(store: Arc<S>) -> Self {
        Self::new(store, CollatorConfig::from_env())
    }

    /// Get the configuration.
    pub fn config(&self) -> &CollatorConfig {
        &self.config
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Split a section at `at_rank`; returns the new section.
    pub fn split_section(&self, tradition: TraditionId, section: SectionId, at_rank: Rank) -> Result<SectionId> {
        let suffix = self.config.split_name_suffix.as_str();
        self.run_unit(tradition, "split_section", |graph| {
            let new_section = splice::split_section(graph, section, at_rank, suffix)?;
            Ok((new_section, vec![section, new_section]))
        })
    }

    /// Split a section at a caller-supplied rank string.
    pub fn split_section_at(&self, tradition: TraditionId, section: SectionId, raw_rank: &str) -> Result<SectionId> {
        let at_rank = rank::parse_rank(raw_rank)?;
        self.split_section(tradition, section, at_rank)
    }

    /// Merge `second` into `first`.
    pub fn merge_sections(&self, tradition: TraditionId, first: SectionId, second: SectionId) -> Result<()> {
        self.run_unit(tradition, "merge_sections", |graph| {
            splice::merge_sections(graph, first, second)?;
            Ok(((), vec![first]))
        })
    }

    /// Repair ranks downstream of `reading`.
    pub fn recalculate_rank(&self, tradition: TraditionId, reading: ReadingId) -> Result<RankReport> {
        self.run_unit(tradition, "recalculate_rank", |graph| {
            let section = graph.require_reading(reading)?.section;
            let report = rank::recalculate_rank(graph, reading)?;
            Ok((report, vec![section]))
        })
    }

    /// Move a section directly after `prior`, or to the front.
    pub fn reorder_section(
        &self,
        tradition: TraditionId,
        section: SectionId,
        prior: Option<SectionId>,
    ) -> Result<()> {
        self.run_unit(tradition, "reorder_section", |graph| {
            splice::reorder_after(graph, section, prior)?;
            Ok(((), Vec::new()))
        })
    }

    /// Delete a section and everything in it; returns the readings removed.
    pub fn delete_section(&self, tradition: TraditionId, section: SectionId) -> Result<usize> {
        self.run_unit(tradition, "delete_section", |graph| {
            let removed = splice::delete_section(graph, section)?;
            Ok((removed, Vec::new()))
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Committed graph of a tradition.
    pub fn snapshot(&self, tradition: TraditionId) -> Result<Arc<CollationGraph>> {
        self.store.snapshot(tradition).map_err(CollationError::from_store)
    }

    /// Sections in tradition order.
    pub fn sections(&self, tradition: TraditionId) -> Result<Vec<SectionInfo>> {
        let graph = self.snapshot(tradition)?;
        graph
            .sections_in_order()
            .iter()
            .map(|id| graph.require_section(*id).cloned())
            .collect()
    }

    /// Every reading of a section, in traversal order.
    pub fn section_readings(&self, tradition: TraditionId, section: SectionId) -> Result<Vec<Reading>> {
        let graph = self.snapshot(tradition)?;
        traversal::section_readings(&graph, section)?
            .into_iter()
            .map(|id| graph.require_reading(id).cloned())
            .collect()
    }

    /// Witness sigils carried in a section.
    pub fn section_witnesses(&self, tradition: TraditionId, section: SectionId) -> Result<BTreeSet<Sigil>> {
        let graph = self.snapshot(tradition)?;
        traversal::witnesses_of_section(&graph, section)
    }

    /// Relations whose source lies in a section.
    pub fn section_relations(&self, tradition: TraditionId, section: SectionId) -> Result<Vec<RelationEdge>> {
        let graph = self.snapshot(tradition)?;
        Ok(traversal::section_relations(&graph, section)?.into_iter().cloned().collect())
    }

    /// Pairs of readings in `lo..=hi` that could be merged.
    pub fn mergeable_readings(
        &self,
        tradition: TraditionId,
        section: SectionId,
        lo: Rank,
        hi: Rank,
    ) -> Result<Vec<ReadingPair>> {
        let graph = self.snapshot(tradition)?;
        duplicates::candidate_pairs(&graph, section, lo, hi)
    }

    /// Groups of identical readings in `lo..=hi`.
    pub fn identical_readings(
        &self,
        tradition: TraditionId,
        section: SectionId,
        lo: Rank,
        hi: Rank,
    ) -> Result<Vec<IdenticalGroup>> {
        let graph = self.snapshot(tradition)?;
        duplicates::identical_readings(&graph, section, lo, hi)
    }

    /// Flatten the given sections, in the given order.
    pub fn flatten(
        &self,
        tradition: TraditionId,
        sections: &[SectionId],
        options: &FlattenOptions,
    ) -> Result<AlignmentTable> {
        let graph = self.snapshot(tradition)?;
        flatten::flatten(&graph, sections, options)
    }

    /// Flatten every section in tradition order.
    pub fn flatten_tradition(&self, tradition: TraditionId, options: &FlattenOptions) -> Result<AlignmentTable> {
        let graph = self.snapshot(tradition)?;
        flatten::flatten(&graph, graph.sections_in_order(), options)
    }

    /// Check every section and the section chain of the committed graph.
    pub fn check_tradition(&self, tradition: TraditionId) -> Result<()> {
        let graph = self.snapshot(tradition)?;
        invariants::check_tradition(&graph)
    }

    /// Run `op` inside a unit of work.
    ///
    /// `op` returns its value and the sections it touched.
    fn run_unit<T>(
        &self,
        tradition: TraditionId,
        operation: &'static str,
        op: impl FnOnce(&mut CollationGraph) -> Result<(T, Vec<SectionId>)>,
    ) -> Result<T> {
        let mut unit = self
            .store
            .begin_unit_of_work(tradition)
            .map_err(CollationError::from_store)?;

        let outcome = op(unit.graph_mut()).and_then(|(value, touched)| {
            if self.config.verify_invariants {
                for section in &touched {
                    invariants::check_section(unit.graph(), *section)?;
                }
            }
            Ok(value)
        });

        match outcome {
            Ok(value) => {
                self.store.commit(unit).map_err(CollationError::from_store)?;
                debug!(tradition = %tradition, operation, "Committed");
                Ok(value)
            }
            Err(e) => {
                warn!(tradition = %tradition, operation, error = %e, "Rolling back unit of work");
                self.store.rollback(unit);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemoryGraphStore;

    /// A: the cat sat; B: the dog sat
    fn setup() -> (Collator<InMemoryGraphStore>, TraditionId, SectionId) {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("fork");
        let the = graph.add_reading(s, "the", None).unwrap();
        let cat = graph.add_reading(s, "cat", None).unwrap();
        let dog = graph.add_reading(s, "dog", None).unwrap();
        let sat = graph.add_reading(s, "sat", None).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[the, cat, sat]).unwrap();
        graph.add_witness_path(s, &Sigil::base("B"), &[the, dog, sat]).unwrap();
        rank::assign_ranks(&mut graph, s).unwrap();

        let store = Arc::new(InMemoryGraphStore::new());
        let t = store.insert_tradition(graph);
        (Collator::new(store, CollatorConfig::default()), t, s)
    }

    #[test]
    fn test_split_commits() {
        let (collator, t, s) = setup();
        let s2 = collator.split_section(t, s, 2).unwrap();

        let sections = collator.sections(t).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].id, s2);
        assert_eq!(sections[1].name, "fork split");
        collator.check_tradition(t).unwrap();
    }

    #[test]
    fn test_failed_operation_leaves_graph_untouched() {
        let (collator, t, s) = setup();
        let before = collator.snapshot(t).unwrap();

        let err = collator.split_section(t, s, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = collator.split_section_at(t, s, "two").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(*collator.snapshot(t).unwrap(), *before);
    }

    #[test]
    fn test_invariant_failure_rolls_back() {
        let (collator, t, s) = setup();

        // Commit a stale rank on "cat"
        let mut graph = (*collator.snapshot(t).unwrap()).clone();
        let id_of = |g: &CollationGraph, text: &str| g.readings().find(|r| r.text == text).map(|r| r.id).unwrap();
        let cat = id_of(&graph, "cat");
        graph.reading_mut(cat).unwrap().rank = Some(9);
        collator.store().insert_tradition_with_id(t, graph.clone());
        let corrupted = collator.snapshot(t).unwrap();

        // Repairing below "cat" leaves it stale, so the check fails
        let err = collator.recalculate_rank(t, id_of(&graph, "sat")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(*collator.snapshot(t).unwrap(), *corrupted);

        // Sections untouched by an operation are not checked
        collator.reorder_section(t, s, None).unwrap();

        // Repairing from above "cat" fixes it
        collator.recalculate_rank(t, id_of(&graph, "the")).unwrap();
        collator.check_tradition(t).unwrap();
    }

    #[test]
    fn test_unknown_tradition_is_store_error() {
        let (collator, _, s) = setup();
        let err = collator.split_section(TraditionId::random(), s, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_queries() {
        let (collator, t, s) = setup();
        assert_eq!(collator.section_readings(t, s).unwrap().len(), 6);
        assert_eq!(collator.section_witnesses(t, s).unwrap().len(), 2);
        assert!(collator.mergeable_readings(t, s, 0, 10).unwrap().is_empty());
        assert!(collator.identical_readings(t, s, 0, 10).unwrap().is_empty());

        let table = collator.flatten_tradition(t, &FlattenOptions::default()).unwrap();
        assert_eq!(table.length, 3);
        assert_eq!(table, collator.flatten(t, &[s], &FlattenOptions::default()).unwrap());
    }
}
