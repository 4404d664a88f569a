//! Pure traversal functions over a [`CollationGraph`].
//!
//! Every function takes the graph by shared reference and builds its own
//! visited set, so no traversal state survives between calls.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use super::CollationGraph;
use crate::error::{CollationError, Result};
use crate::types::{Rank, Reading, ReadingId, RelationEdge, SectionId, SequenceEdge, Sigil};

/// Depth-first traversal along sequence edges, visiting each reading once.
///
/// Successors are explored in edge-id order. The order is deterministic
/// for a given graph but carries no rank guarantee; sort by rank for a
/// left-to-right view.
pub fn traverse_from(graph: &CollationGraph, start: ReadingId) -> Vec<ReadingId> {
    let mut order = Vec::new();
    let mut visited: HashSet<ReadingId> = HashSet::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if !visited.insert(current) || graph.reading(current).is_none() {
            continue;
        }
        order.push(current);
        let successors: Vec<ReadingId> = graph.outgoing_sequence(current).map(|e| e.to).collect();
        // Reverse so the lowest edge id is explored first
        for next in successors.into_iter().rev() {
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }

    order
}

/// Resolve a section's start reading.
pub fn section_start(graph: &CollationGraph, section: SectionId) -> Result<ReadingId> {
    graph.require_section(section)?;
    graph.start_of(section).ok_or(CollationError::MissingStart(section))
}

/// Resolve a section's end reading.
pub fn section_end(graph: &CollationGraph, section: SectionId) -> Result<ReadingId> {
    graph.require_section(section)?;
    graph.end_of(section).ok_or(CollationError::MissingEnd(section))
}

/// All readings of a section in traversal order.
pub fn section_readings(graph: &CollationGraph, section: SectionId) -> Result<Vec<ReadingId>> {
    let start = section_start(graph, section)?;
    Ok(traverse_from(graph, start))
}

/// Readings of a section whose rank lies in `lo..=hi`, in traversal order.
///
/// Unranked readings never match.
pub fn readings_between_ranks(
    graph: &CollationGraph,
    section: SectionId,
    lo: Rank,
    hi: Rank,
) -> Result<Vec<&Reading>> {
    let readings: Vec<&Reading> = section_readings(graph, section)?
        .into_iter()
        .filter_map(|id| graph.reading(id))
        .filter(|r| matches!(r.rank, Some(rank) if lo <= rank && rank <= hi))
        .collect();
    debug!(section = %section, lo, hi, count = readings.len(), "collected readings between ranks");
    Ok(readings)
}

/// Union of the witness sigils on every sequence edge of a section.
pub fn witnesses_of_section(graph: &CollationGraph, section: SectionId) -> Result<BTreeSet<Sigil>> {
    let mut witnesses = BTreeSet::new();
    for id in section_readings(graph, section)? {
        for edge in graph.outgoing_sequence(id) {
            witnesses.extend(edge.witnesses.iter().cloned());
        }
    }
    Ok(witnesses)
}

/// Relations whose source reading belongs to the section.
pub fn section_relations(graph: &CollationGraph, section: SectionId) -> Result<Vec<&RelationEdge>> {
    let members: HashSet<ReadingId> = section_readings(graph, section)?.into_iter().collect();
    Ok(graph.relations().filter(|r| members.contains(&r.source)).collect())
}

/// True if `to` can be reached from `from` along sequence edges.
///
/// A reading reaches itself.
pub fn is_reachable(graph: &CollationGraph, from: ReadingId, to: ReadingId) -> bool {
    if from == to {
        return true;
    }
    let mut visited: HashSet<ReadingId> = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        for edge in graph.outgoing_sequence(current) {
            if edge.to == to {
                return true;
            }
            if !visited.contains(&edge.to) {
                stack.push(edge.to);
            }
        }
    }
    false
}

/// The sequence edge a witness takes out of `reading`.
///
/// Prefers an edge carrying the exact sigil; a layered sigil falls back to
/// its base witness. More than one candidate edge is a branch and fails
/// with `InvariantViolation`.
pub fn next_on_path<'g>(
    graph: &'g CollationGraph,
    reading: ReadingId,
    sigil: &Sigil,
) -> Result<Option<&'g SequenceEdge>> {
    if let Some(edge) = single_edge_carrying(graph, reading, sigil)? {
        return Ok(Some(edge));
    }
    if sigil.is_layer() {
        return single_edge_carrying(graph, reading, &sigil.to_base());
    }
    Ok(None)
}

fn single_edge_carrying<'g>(
    graph: &'g CollationGraph,
    reading: ReadingId,
    sigil: &Sigil,
) -> Result<Option<&'g SequenceEdge>> {
    let mut carrying = graph.outgoing_sequence(reading).filter(|e| e.carries(sigil));
    let first = carrying.next();
    if let Some(second) = carrying.next() {
        let section = graph.reading(reading).map(|r| r.section);
        return Err(CollationError::InvariantViolation {
            section,
            detail: format!(
                "witness {} branches at {} (to {} and {})",
                sigil,
                reading,
                first.map(|e| e.to.to_string()).unwrap_or_default(),
                second.to
            ),
        });
    }
    Ok(first)
}

/// The readings a witness passes through, start to end inclusive.
///
/// Fails with `WitnessNotFound` if the witness does not leave the start,
/// `InvariantViolation` if its path stops short of the end, and
/// `CyclicGraph` if it revisits a reading.
pub fn witness_path(graph: &CollationGraph, section: SectionId, sigil: &Sigil) -> Result<Vec<ReadingId>> {
    let start = section_start(graph, section)?;
    let end = section_end(graph, section)?;

    let mut path = vec![start];
    let mut seen: HashSet<ReadingId> = HashSet::from([start]);
    let mut current = start;

    while current != end {
        let next = match next_on_path(graph, current, sigil)? {
            Some(edge) => edge.to,
            None if current == start => {
                return Err(CollationError::WitnessNotFound {
                    section,
                    sigil: sigil.clone(),
                })
            }
            None => {
                return Err(CollationError::invariant(
                    section,
                    format!("path of witness {} stops at {}", sigil, current),
                ))
            }
        };
        if !seen.insert(next) {
            return Err(CollationError::CyclicGraph { reading: next });
        }
        path.push(next);
        current = next;
    }

    Ok(path)
}
