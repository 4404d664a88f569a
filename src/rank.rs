//! Rank engine: longest-path labelling of readings.
//!
//! A reading's rank is `1 + max(rank of its sequence predecessors)`, and a
//! section start is rank 0. Readings that are alternatives at the same
//! textual position therefore share a rank, which is what makes "same rank"
//! mean "same alignment column".
//!
//! ## Algorithm
//!
//! 1. Collect every reading reachable from the origin set in topological
//!    order (iterative three-colour DFS; meeting an in-progress reading is a
//!    cycle)
//! 2. If a reading in that region has an unranked predecessor outside it,
//!    restart from the nearest ranked ancestor of that predecessor
//! 3. Label the region in topological order
//!
//! Only the region downstream of the origins is touched, so repairing after
//! an edit near the end of a long section is cheap.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::error::{CollationError, Result};
use crate::graph::traversal::section_start;
use crate::graph::CollationGraph;
use crate::types::{Rank, ReadingId, SectionId};

/// Summary of a rank recalculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankReport {
    /// Readings labelled.
    pub visited: usize,
    /// Readings whose rank changed.
    pub changed: usize,
    /// Restarts from an ancestor because of an unranked predecessor.
    pub restarts: usize,
}

/// Parse a caller-supplied rank.
pub fn parse_rank(raw: &str) -> Result<Rank> {
    raw.trim()
        .parse::<Rank>()
        .map_err(|_| CollationError::InvalidRank(raw.to_string()))
}

/// Rank a whole section from scratch, starting at its start reading.
pub fn assign_ranks(graph: &mut CollationGraph, section: SectionId) -> Result<RankReport> {
    let start = section_start(graph, section)?;
    recalculate_rank(graph, start)
}

/// Recompute ranks downstream of one reading.
///
/// Callers invoke this after they finish rewiring edges at `from`.
pub fn recalculate_rank(graph: &mut CollationGraph, from: ReadingId) -> Result<RankReport> {
    recalculate_ranks_from(graph, &[from])
}

/// Recompute ranks downstream of several readings in a single pass.
pub fn recalculate_ranks_from(graph: &mut CollationGraph, from: &[ReadingId]) -> Result<RankReport> {
    let mut origins: BTreeSet<ReadingId> = BTreeSet::new();
    for &id in from {
        graph.require_reading(id)?;
        origins.insert(id);
    }

    let mut restarts = 0;
    loop {
        let region = topological_region(graph, &origins)?;
        let members: HashSet<ReadingId> = region.iter().copied().collect();

        let orphan = region
            .iter()
            .flat_map(|id| graph.incoming_sequence(*id).map(|e| e.from))
            .find(|p| !members.contains(p) && graph.reading(*p).map_or(false, |r| r.rank.is_none()));

        if let Some(orphan) = orphan {
            let anchor = nearest_ranked_ancestor(graph, orphan);
            warn!(
                orphan = %orphan,
                anchor = %anchor,
                "Unranked predecessor outside repair region, restarting from ancestor"
            );
            origins.insert(anchor);
            restarts += 1;
            continue;
        }

        let mut changed = 0;
        for id in &region {
            let new_rank = derived_rank(graph, *id);
            if let Some(reading) = graph.reading_mut(*id) {
                if reading.rank != Some(new_rank) {
                    reading.rank = Some(new_rank);
                    changed += 1;
                }
            }
        }

        let report = RankReport {
            visited: region.len(),
            changed,
            restarts,
        };
        debug!(
            origins = origins.len(),
            visited = report.visited,
            changed = report.changed,
            restarts = report.restarts,
            "Recalculated ranks"
        );
        return Ok(report);
    }
}

/// Rank implied by a reading's predecessors.
fn derived_rank(graph: &CollationGraph, id: ReadingId) -> Rank {
    let Some(reading) = graph.reading(id) else {
        return 0;
    };
    if reading.is_start {
        return 0;
    }
    graph
        .incoming_sequence(id)
        .filter_map(|e| graph.reading(e.from).and_then(|p| p.rank))
        .max()
        .map(|m| m + 1)
        .unwrap_or_else(|| reading.rank.unwrap_or(0))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Readings reachable from `origins`, in topological order.
pub(crate) fn topological_region(graph: &CollationGraph, origins: &BTreeSet<ReadingId>) -> Result<Vec<ReadingId>> {
    let successors = |id: ReadingId| -> Vec<ReadingId> { graph.outgoing_sequence(id).map(|e| e.to).collect() };

    let mut marks: HashMap<ReadingId, Mark> = HashMap::new();
    let mut post_order = Vec::new();

    for &origin in origins {
        if marks.contains_key(&origin) {
            continue;
        }
        marks.insert(origin, Mark::InProgress);
        let mut stack: Vec<(ReadingId, Vec<ReadingId>, usize)> = vec![(origin, successors(origin), 0)];

        loop {
            let step = match stack.last_mut() {
                None => break,
                Some((_, succs, idx)) => {
                    let next = succs.get(*idx).copied();
                    *idx += 1;
                    next
                }
            };
            match step {
                Some(next) => match marks.get(&next) {
                    Some(Mark::InProgress) => return Err(CollationError::CyclicGraph { reading: next }),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::InProgress);
                        stack.push((next, successors(next), 0));
                    }
                },
                None => {
                    if let Some((id, _, _)) = stack.pop() {
                        marks.insert(id, Mark::Done);
                        post_order.push(id);
                    }
                }
            }
        }
    }

    post_order.reverse();
    Ok(post_order)
}

/// Closest ancestor (backwards BFS) that carries a rank, else the furthest root.
fn nearest_ranked_ancestor(graph: &CollationGraph, from: ReadingId) -> ReadingId {
    let mut queue = VecDeque::from([from]);
    let mut seen: HashSet<ReadingId> = HashSet::from([from]);
    let mut root = from;

    while let Some(current) = queue.pop_front() {
        let mut has_predecessor = false;
        for edge in graph.incoming_sequence(current) {
            has_predecessor = true;
            if !seen.insert(edge.from) {
                continue;
            }
            if graph.reading(edge.from).map_or(false, |r| r.rank.is_some()) {
                return edge.from;
            }
            queue.push_back(edge.from);
        }
        if !has_predecessor {
            root = current;
        }
    }

    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sigil;

    fn rank_of(graph: &CollationGraph, id: ReadingId) -> Option<Rank> {
        graph.reading(id).and_then(|r| r.rank)
    }

    /// A: start a b c end; B: start a c end
    fn build_omission() -> (CollationGraph, SectionId, [ReadingId; 3]) {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("omission");
        let a = graph.add_reading(s, "a", None).unwrap();
        let b = graph.add_reading(s, "b", None).unwrap();
        let c = graph.add_reading(s, "c", None).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[a, b, c]).unwrap();
        graph.add_witness_path(s, &Sigil::base("B"), &[a, c]).unwrap();
        (graph, s, [a, b, c])
    }

    #[test]
    fn test_longest_path_labelling() {
        let (mut graph, s, [a, b, c]) = build_omission();
        let report = assign_ranks(&mut graph, s).unwrap();

        assert_eq!(report.visited, 5);
        assert_eq!(rank_of(&graph, graph.start_of(s).unwrap()), Some(0));
        assert_eq!(rank_of(&graph, a), Some(1));
        assert_eq!(rank_of(&graph, b), Some(2));
        // c follows both a (rank 1) and b (rank 2)
        assert_eq!(rank_of(&graph, c), Some(3));
        assert_eq!(rank_of(&graph, graph.end_of(s).unwrap()), Some(4));
    }

    #[test]
    fn test_downstream_only_repair() {
        let (mut graph, s, [a, b, c]) = build_omission();
        assign_ranks(&mut graph, s).unwrap();

        // Insert a new reading between b and c for witness A
        let x = graph.add_reading(s, "x", None).unwrap();
        let bc = graph.find_edge(b, c, crate::types::EdgeKind::Sequence).unwrap();
        graph.remove_edge(bc);
        graph.add_witness_link(b, x, Sigil::base("A")).unwrap();
        graph.add_witness_link(x, c, Sigil::base("A")).unwrap();

        let report = recalculate_rank(&mut graph, b).unwrap();
        assert_eq!(report.visited, 4); // b, x, c, end
        assert_eq!(rank_of(&graph, a), Some(1));
        assert_eq!(rank_of(&graph, x), Some(3));
        assert_eq!(rank_of(&graph, c), Some(4));
        assert_eq!(rank_of(&graph, graph.end_of(s).unwrap()), Some(5));
    }

    #[test]
    fn test_cycle_is_reported() {
        let (mut graph, s, [a, _, c]) = build_omission();
        graph.add_witness_link(c, a, Sigil::base("C")).unwrap();
        let err = assign_ranks(&mut graph, s).unwrap_err();
        assert!(matches!(err, CollationError::CyclicGraph { .. }));
    }

    #[test]
    fn test_recovers_from_unranked_ancestor() {
        let (mut graph, s, [a, b, c]) = build_omission();
        assign_ranks(&mut graph, s).unwrap();

        // Lose the rank of `a`; repairing from `b` must re-derive it
        graph.reading_mut(a).unwrap().rank = None;
        let report = recalculate_rank(&mut graph, b).unwrap();

        assert_eq!(report.restarts, 1);
        assert_eq!(rank_of(&graph, a), Some(1));
        assert_eq!(rank_of(&graph, b), Some(2));
        assert_eq!(rank_of(&graph, c), Some(3));
    }

    #[test]
    fn test_unknown_origin() {
        let mut graph = CollationGraph::new();
        let err = recalculate_rank(&mut graph, ReadingId::new(9)).unwrap_err();
        assert_eq!(err, CollationError::ReadingNotFound(ReadingId::new(9)));
    }

    #[test]
    fn test_parse_rank() {
        assert_eq!(parse_rank(" 12 ").unwrap(), 12);
        assert_eq!(parse_rank("-1").unwrap_err(), CollationError::InvalidRank("-1".into()));
        assert!(parse_rank("twelve").is_err());
    }
}
