//! Consistency checks run after every mutation.
//!
//! A section is sound when:
//!
//! 1. its sequence edges are acyclic
//! 2. `rank(start) == 0` and every other reading has
//!    `rank == 1 + max(rank of its predecessors)`
//! 3. every witness sigil on its edges has exactly one path from start to end
//! 4. its start and end readings exist, are unique, and every reading
//!    reachable from the start is tagged with the section

use std::collections::{BTreeSet, HashSet};

use tracing::error;

use crate::error::{CollationError, Result};
use crate::graph::traversal::{section_end, section_start, traverse_from, witness_path};
use crate::graph::CollationGraph;
use crate::rank::topological_region;
use crate::types::{EdgeId, SectionId, Sigil};

/// Verify all four section invariants.
pub fn check_section(graph: &CollationGraph, section: SectionId) -> Result<()> {
    let result = check_section_inner(graph, section);
    if let Err(e) = &result {
        error!(section = %section, error = %e, "Section invariant check failed");
    }
    result
}

fn check_section_inner(graph: &CollationGraph, section: SectionId) -> Result<()> {
    let start = section_start(graph, section)?;
    let end = section_end(graph, section)?;
    let violation = |detail: String| CollationError::invariant(section, detail);

    // Boundaries and membership
    let readings = traverse_from(graph, start);
    if !readings.contains(&end) {
        return Err(violation(format!("end {} is not reachable from start {}", end, start)));
    }
    for id in &readings {
        let reading = graph.require_reading(*id)?;
        if reading.section != section {
            return Err(violation(format!("{} is tagged with section {}", id, reading.section)));
        }
        if reading.is_start != (*id == start) {
            return Err(violation(format!("{} has a wrong start flag", id)));
        }
        if reading.is_end != (*id == end) {
            return Err(violation(format!("{} has a wrong end flag", id)));
        }
        if reading.is_placeholder {
            return Err(violation(format!("placeholder {} left in section", id)));
        }
    }
    if graph.outgoing_sequence(end).next().is_some() {
        return Err(violation(format!("end {} has outgoing sequence edges", end)));
    }

    // Acyclicity
    topological_region(graph, &BTreeSet::from([start]))?;

    // Ranks
    for id in &readings {
        let reading = graph.require_reading(*id)?;
        let rank = reading
            .rank
            .ok_or_else(|| violation(format!("{} has no rank", id)))?;
        let expected = if *id == start {
            Some(0)
        } else {
            graph
                .incoming_sequence(*id)
                .map(|e| graph.reading(e.from).and_then(|p| p.rank).map(|r| r + 1))
                .collect::<Option<Vec<_>>>()
                .and_then(|ranks| ranks.into_iter().max())
        };
        if expected != Some(rank) {
            return Err(violation(format!(
                "{} has rank {} but its predecessors imply {:?}",
                id, rank, expected
            )));
        }
    }

    // Witness paths
    let mut witnesses: BTreeSet<Sigil> = BTreeSet::new();
    for id in &readings {
        for edge in graph.outgoing_sequence(*id) {
            witnesses.extend(edge.witnesses.iter().cloned());
        }
    }
    for sigil in &witnesses {
        let path = witness_path(graph, section, sigil).map_err(|e| match e {
            CollationError::WitnessNotFound { .. } => {
                violation(format!("witness {} does not leave the section start", sigil))
            }
            other => other,
        })?;
        let on_path: HashSet<EdgeId> = path
            .windows(2)
            .filter_map(|pair| graph.find_edge(pair[0], pair[1], crate::types::EdgeKind::Sequence))
            .collect();
        for id in &readings {
            for edge in graph.outgoing_sequence(*id) {
                if edge.carries(sigil) && !on_path.contains(&edge.id) {
                    return Err(violation(format!(
                        "edge {} ({} -> {}) carries {} off its path",
                        edge.id, edge.from, edge.to, sigil
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Verify every section plus the tradition-level section chain.
pub fn check_tradition(graph: &CollationGraph) -> Result<()> {
    let order = graph.sections_in_order();
    let unique: BTreeSet<SectionId> = order.iter().copied().collect();
    if unique.len() != order.len() {
        return Err(CollationError::InvariantViolation {
            section: None,
            detail: "a section appears twice in the section order".to_string(),
        });
    }
    for section in order {
        check_section(graph, *section)?;
    }
    for reading in graph.readings() {
        if !unique.contains(&reading.section) {
            return Err(CollationError::InvariantViolation {
                section: None,
                detail: format!("{} is tagged with unknown section {}", reading.id, reading.section),
            });
        }
    }
    for edge in graph.edges() {
        let from = graph.reading(edge.from).map(|r| r.section);
        let to = graph.reading(edge.to).map(|r| r.section);
        if from != to {
            return Err(CollationError::InvariantViolation {
                section: from,
                detail: format!("edge {} crosses from section {:?} to {:?}", edge.id, from, to),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::assign_ranks;
    use crate::types::ReadingId;

    fn build_ranked() -> (CollationGraph, SectionId, [ReadingId; 3]) {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("ranked");
        let a = graph.add_reading(s, "a", None).unwrap();
        let b = graph.add_reading(s, "b", None).unwrap();
        let c = graph.add_reading(s, "c", None).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[a, b]).unwrap();
        graph.add_witness_path(s, &Sigil::base("B"), &[a, c]).unwrap();
        assign_ranks(&mut graph, s).unwrap();
        (graph, s, [a, b, c])
    }

    #[test]
    fn test_sound_section_passes() {
        let (graph, s, _) = build_ranked();
        check_section(&graph, s).unwrap();
        check_tradition(&graph).unwrap();
    }

    #[test]
    fn test_stale_rank_fails() {
        let (mut graph, s, [_, b, _]) = build_ranked();
        graph.reading_mut(b).unwrap().rank = Some(7);
        let err = check_section(&graph, s).unwrap_err();
        assert!(matches!(err, CollationError::InvariantViolation { section: Some(x), .. } if x == s));
    }

    #[test]
    fn test_off_path_edge_fails() {
        let (mut graph, s, [_, b, c]) = build_ranked();
        // b -> c is not reachable along A's path (start a b end)
        graph.add_witness_link(c, b, Sigil::base("A")).unwrap();
        assign_ranks(&mut graph, s).unwrap();
        let err = check_section(&graph, s).unwrap_err();
        assert!(err.to_string().contains("off its path"));
    }

    #[test]
    fn test_broken_witness_path_fails() {
        let (mut graph, s, [_, b, _]) = build_ranked();
        let end = graph.end_of(s).unwrap();
        let edge = graph.find_edge(b, end, crate::types::EdgeKind::Sequence).unwrap();
        graph.remove_edge(edge);
        assert!(check_section(&graph, s).is_err());
    }

    #[test]
    fn test_duplicate_order_entry_fails() {
        let (graph, s, _) = build_ranked();
        let mut data = graph.to_data();
        data.section_order.push(s);
        let graph = CollationGraph::try_from(data).unwrap();
        assert!(check_tradition(&graph).is_err());
    }
}
