//! Duplicate detector.
//!
//! Two questions are answered over a rank window of one section:
//!
//! - which pairs of readings *could* be identical: same display text, and
//!   neither reachable from the other, so merging them cannot fold a path
//!   onto itself
//! - which readings *are* identical: same rank and the same NFC-composed
//!   text, grouped in one linear scan over the rank-sorted readings
//!
//! Start, end and placeholder readings are never candidates.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::graph::traversal::{is_reachable, readings_between_ranks};
use crate::graph::CollationGraph;
use crate::normalize::comparison_key;
use crate::types::{Rank, Reading, ReadingId, SectionId};

/// Two readings that could be merged without creating a cycle.
///
/// `first` precedes `second` in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadingPair {
    /// Earlier reading in traversal order.
    pub first: ReadingId,
    /// Later reading in traversal order.
    pub second: ReadingId,
}

impl ReadingPair {
    /// True if the pair contains `reading`.
    pub fn contains(&self, reading: ReadingId) -> bool {
        self.first == reading || self.second == reading
    }
}

/// Readings at one rank sharing a normalised text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdenticalGroup {
    /// Shared rank.
    pub rank: Rank,
    /// Shared NFC text.
    pub text: String,
    /// Members in scan order; always at least two.
    pub readings: Vec<ReadingId>,
}

/// Pairs of distinct readings in `lo..=hi` with equal text that are not
/// connected by a sequence path.
///
/// Pairs are ordered by the traversal position of `first`, then `second`.
pub fn candidate_pairs(graph: &CollationGraph, section: SectionId, lo: Rank, hi: Rank) -> Result<Vec<ReadingPair>> {
    let readings: Vec<&Reading> = readings_between_ranks(graph, section, lo, hi)?
        .into_iter()
        .filter(|r| !r.is_boundary())
        .collect();

    let mut pairs = Vec::new();
    for (i, a) in readings.iter().enumerate() {
        for b in &readings[i + 1..] {
            if a.text != b.text {
                continue;
            }
            if is_reachable(graph, a.id, b.id) || is_reachable(graph, b.id, a.id) {
                continue;
            }
            pairs.push(ReadingPair {
                first: a.id,
                second: b.id,
            });
        }
    }

    debug!(
        section = %section,
        lo,
        hi,
        scanned = readings.len(),
        pairs = pairs.len(),
        "Found could-be-identical readings"
    );
    Ok(pairs)
}

/// Groups of readings in `lo..=hi` that share a rank and NFC text.
///
/// A group closes when the scan moves past its rank; groups of one are
/// dropped. Readings that also differ in relation metadata still form a
/// single group.
pub fn identical_readings(
    graph: &CollationGraph,
    section: SectionId,
    lo: Rank,
    hi: Rank,
) -> Result<Vec<IdenticalGroup>> {
    let mut readings: Vec<&Reading> = readings_between_ranks(graph, section, lo, hi)?
        .into_iter()
        .filter(|r| !r.is_boundary())
        .collect();
    // Stable, so traversal order is kept within a rank
    readings.sort_by_key(|r| r.rank);

    let mut groups = Vec::new();
    let mut current_rank: Option<Rank> = None;
    let mut open: Vec<(String, Vec<ReadingId>)> = Vec::new();

    for reading in readings {
        let Some(rank) = reading.rank else {
            continue;
        };
        if current_rank != Some(rank) {
            if let Some(closed) = current_rank {
                flush(closed, &mut open, &mut groups);
            }
            current_rank = Some(rank);
        }
        let key = comparison_key(&reading.text);
        match open.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(reading.id),
            None => open.push((key, vec![reading.id])),
        }
    }
    if let Some(closed) = current_rank {
        flush(closed, &mut open, &mut groups);
    }

    debug!(section = %section, lo, hi, groups = groups.len(), "Found identical readings");
    Ok(groups)
}

fn flush(rank: Rank, open: &mut Vec<(String, Vec<ReadingId>)>, groups: &mut Vec<IdenticalGroup>) {
    for (text, readings) in open.drain(..) {
        if readings.len() > 1 {
            groups.push(IdenticalGroup { rank, text, readings });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::assign_ranks;
    use crate::types::Sigil;

    /// A: and the cat and; B: but the dog and
    fn build() -> (CollationGraph, SectionId, Vec<ReadingId>) {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("dup");
        let ids: Vec<ReadingId> = ["and", "but", "the", "cat", "dog", "and", "and"]
            .iter()
            .map(|t| graph.add_reading(s, *t, None).unwrap())
            .collect();
        graph
            .add_witness_path(s, &Sigil::base("A"), &[ids[0], ids[2], ids[3], ids[5]])
            .unwrap();
        graph
            .add_witness_path(s, &Sigil::base("B"), &[ids[1], ids[2], ids[4], ids[6]])
            .unwrap();
        assign_ranks(&mut graph, s).unwrap();
        (graph, s, ids)
    }

    #[test]
    fn test_candidate_pairs_skip_connected_readings() {
        let (graph, s, ids) = build();
        let pairs = candidate_pairs(&graph, s, 0, 10).unwrap();

        // ids[0] reaches both later "and"s through the shared "the";
        // ids[5] and ids[6] sit on parallel branches
        assert_eq!(pairs, vec![ReadingPair { first: ids[5], second: ids[6] }]);
        for p in &pairs {
            assert!(!is_reachable(&graph, p.first, p.second));
            assert!(!is_reachable(&graph, p.second, p.first));
        }
    }

    #[test]
    fn test_candidate_pairs_respect_window() {
        let (graph, s, _) = build();
        assert!(candidate_pairs(&graph, s, 0, 2).unwrap().is_empty());
    }

    #[test]
    fn test_identical_groups_by_rank() {
        let (graph, s, ids) = build();
        let groups = identical_readings(&graph, s, 0, 10).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rank, 4);
        assert_eq!(groups[0].text, "and");
        let mut members = groups[0].readings.clone();
        members.sort();
        assert_eq!(members, vec![ids[5], ids[6]]);
    }

    #[test]
    fn test_identical_uses_nfc() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("nfc");
        let composed = graph.add_reading(s, "caf\u{e9}", None).unwrap();
        let decomposed = graph.add_reading(s, "cafe\u{301}", None).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[composed]).unwrap();
        graph.add_witness_path(s, &Sigil::base("B"), &[decomposed]).unwrap();
        assign_ranks(&mut graph, s).unwrap();

        let groups = identical_readings(&graph, s, 1, 1).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].readings.len(), 2);

        // Could-be-identical compares display text exactly
        assert!(candidate_pairs(&graph, s, 1, 1).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_section() {
        let graph = CollationGraph::new();
        assert!(identical_readings(&graph, SectionId::new(5), 0, 3).unwrap_err().is_not_found());
    }
}
