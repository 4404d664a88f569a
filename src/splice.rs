//! Section splicer: split one section at a rank, merge two adjacent sections.
//!
//! Both operations rewire edges across a section boundary and then hand the
//! affected region to the rank engine. They work on a graph the caller has
//! exclusive access to; the [`Collator`](crate::collator::Collator) provides
//! that through the store's unit of work and rolls back on failure.
//!
//! ## Split
//!
//! 1. Every edge `u -> v` with `rank(u) < at <= rank(v)` crosses the cut
//! 2. Each crossing edge becomes `u -> new_end` and `new_start -> v`,
//!    keeping its witnesses and metadata
//! 3. Readings reachable from `new_start` are retagged with the new section
//! 4. Ranks are repaired in the original section and assigned in the new one
//!
//! ## Merge
//!
//! 1. The boundary readings become placeholders
//! 2. A witness present on only one side is bridged across that side from
//!    its start (or to its end)
//! 3. Placeholders are collapsed by re-linking their neighbours
//! 4. Ranks are repaired downstream of the readings that preceded the
//!    boundary

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::error::{CollationError, Result};
use crate::graph::traversal::{section_end, section_readings, section_start, traverse_from};
use crate::graph::CollationGraph;
use crate::rank::{assign_ranks, recalculate_rank, recalculate_ranks_from};
use crate::types::{EdgeId, EdgeKind, Rank, Reading, ReadingId, SectionId, Sigil};

/// Split `section` so that the readings at `at_rank` start a new section.
///
/// The new section is named `<name><name_suffix>`, inherits the language,
/// and is placed directly after `section` in the tradition order.
pub fn split_section(
    graph: &mut CollationGraph,
    section: SectionId,
    at_rank: Rank,
    name_suffix: &str,
) -> Result<SectionId> {
    let info = graph.require_section(section)?.clone();
    let start = section_start(graph, section)?;
    let old_end = section_end(graph, section)?;
    let members = section_readings(graph, section)?;

    let has_content_at_rank = members
        .iter()
        .filter_map(|id| graph.reading(*id))
        .any(|r| !r.is_boundary() && r.rank == Some(at_rank));
    if at_rank == 0 || !has_content_at_rank {
        return Err(CollationError::RankNotFound { section, rank: at_rank });
    }

    let mut crossing: Vec<EdgeId> = Vec::new();
    for id in &members {
        let from_rank = rank_of(graph, section, *id)?;
        if from_rank >= at_rank {
            continue;
        }
        for edge in graph.outgoing(*id) {
            if rank_of(graph, section, edge.to)? >= at_rank {
                crossing.push(edge.id);
            }
        }
    }

    let end_rank = graph.reading(old_end).and_then(|r| r.rank);
    let new_end = graph.insert_reading(|id| Reading::end(id, section, end_rank));
    let new_start = graph.insert_reading(|id| Reading::start(id, section));

    for edge_id in &crossing {
        let Some(edge) = graph.remove_edge(*edge_id) else {
            continue;
        };
        graph.link(edge.from, new_end, edge.kind, edge.witnesses.clone(), edge.metadata.clone());
        graph.link(new_start, edge.to, edge.kind, edge.witnesses, edge.metadata);
    }
    debug!(section = %section, at_rank, crossing = crossing.len(), "Rewired crossing edges");

    if let Some(first) = graph.section_mut(section) {
        first.end = new_end;
    }
    let new_section = graph.insert_section(
        format!("{}{}", info.name, name_suffix),
        info.language.clone(),
        new_start,
        old_end,
    );
    graph.place_section_after(new_section, Some(section));

    for id in traverse_from(graph, new_start) {
        if let Some(reading) = graph.reading_mut(id) {
            reading.section = new_section;
        }
    }

    prune_empty_witnesses(graph, start, new_end);
    prune_empty_witnesses(graph, new_start, old_end);

    recalculate_rank(graph, new_end)?;
    assign_ranks(graph, new_section)?;

    info!(
        section = %section,
        new_section = %new_section,
        at_rank,
        "Split section"
    );
    Ok(new_section)
}

/// Merge `second` into `first`; `second` must directly follow `first`.
pub fn merge_sections(graph: &mut CollationGraph, first: SectionId, second: SectionId) -> Result<()> {
    graph.require_section(first)?;
    graph.require_section(second)?;
    if first == second || graph.next_section(first) != Some(second) {
        return Err(CollationError::NotAdjacent { first, second });
    }

    let true_start = section_start(graph, first)?;
    let old_end = section_end(graph, first)?;
    let old_start = section_start(graph, second)?;
    let true_end = section_end(graph, second)?;

    let mut origins: BTreeSet<ReadingId> = graph.incoming(old_end).map(|e| e.from).collect();

    let old_witnesses: BTreeSet<Sigil> = graph
        .incoming_sequence(old_end)
        .flat_map(|e| e.witnesses.iter().cloned())
        .collect();
    let new_witnesses: BTreeSet<Sigil> = graph
        .outgoing_sequence(old_start)
        .flat_map(|e| e.witnesses.iter().cloned())
        .collect();
    let lemma_before: Vec<ReadingId> = graph
        .incoming(old_end)
        .filter(|e| e.kind == EdgeKind::LemmaText)
        .map(|e| e.from)
        .collect();
    let lemma_after: Vec<ReadingId> = graph
        .outgoing(old_start)
        .filter(|e| e.kind == EdgeKind::LemmaText)
        .map(|e| e.to)
        .collect();

    for id in [old_end, old_start] {
        if let Some(reading) = graph.reading_mut(id) {
            reading.is_start = false;
            reading.is_end = false;
            reading.is_placeholder = true;
        }
    }

    // Witnesses of the second section that the first never carried
    for sigil in new_witnesses.iter().filter(|w| !resolves_in(w, &old_witnesses)) {
        graph.link(true_start, old_end, EdgeKind::Sequence, [sigil.clone()], BTreeMap::new());
        origins.insert(true_start);
    }
    // Witnesses of the first section that the second never carried
    for sigil in old_witnesses.iter().filter(|w| !resolves_in(w, &new_witnesses)) {
        graph.link(old_start, true_end, EdgeKind::Sequence, [sigil.clone()], BTreeMap::new());
    }
    let all: BTreeSet<Sigil> = old_witnesses.union(&new_witnesses).cloned().collect();
    graph.link(old_end, old_start, EdgeKind::Sequence, all, BTreeMap::new());

    remove_placeholder(graph, first, old_end)?;
    remove_placeholder(graph, first, old_start)?;
    origins.remove(&old_end);

    for from in &lemma_before {
        for to in &lemma_after {
            graph.link(*from, *to, EdgeKind::LemmaText, [], BTreeMap::new());
        }
    }

    let moved: Vec<ReadingId> = graph
        .readings()
        .filter(|r| r.section == second)
        .map(|r| r.id)
        .collect();
    for id in &moved {
        if let Some(reading) = graph.reading_mut(*id) {
            reading.section = first;
        }
    }
    if let Some(info) = graph.section_mut(first) {
        info.end = true_end;
    }
    graph.remove_section_info(second);

    if origins.is_empty() {
        origins.insert(true_start);
    }
    let origins: Vec<ReadingId> = origins.into_iter().collect();
    recalculate_ranks_from(graph, &origins)?;

    info!(
        section = %first,
        merged = %second,
        moved = moved.len(),
        "Merged sections"
    );
    Ok(())
}

/// Move `section` so it directly follows `prior`, or to the front for `None`.
pub fn reorder_after(graph: &mut CollationGraph, section: SectionId, prior: Option<SectionId>) -> Result<()> {
    graph.require_section(section)?;
    if let Some(p) = prior {
        graph.require_section(p)?;
        if p == section {
            return Ok(());
        }
    }
    graph.place_section_after(section, prior);
    info!(section = %section, prior = ?prior, "Reordered section");
    Ok(())
}

/// Remove a section with all of its readings, edges and relations.
pub fn delete_section(graph: &mut CollationGraph, section: SectionId) -> Result<usize> {
    graph.require_section(section)?;
    let mut doomed: BTreeSet<ReadingId> = match graph.start_of(section) {
        Some(start) => traverse_from(graph, start).into_iter().collect(),
        None => BTreeSet::new(),
    };
    doomed.extend(graph.readings().filter(|r| r.section == section).map(|r| r.id));

    for id in &doomed {
        graph.remove_reading(*id);
    }
    graph.remove_section_info(section);

    info!(section = %section, readings = doomed.len(), "Deleted section");
    Ok(doomed.len())
}

fn rank_of(graph: &CollationGraph, section: SectionId, id: ReadingId) -> Result<Rank> {
    graph
        .require_reading(id)?
        .rank
        .ok_or_else(|| CollationError::invariant(section, format!("{} has no rank", id)))
}

/// True if `sigil` has a path through a side carrying `witnesses`.
fn resolves_in(sigil: &Sigil, witnesses: &BTreeSet<Sigil>) -> bool {
    witnesses.contains(sigil) || (sigil.is_layer() && witnesses.contains(&sigil.to_base()))
}

/// Strip witnesses with no reading in the section from a direct
/// `start -> end` sequence edge, unless it is the start's only edge.
///
/// A sigil stays on the edge when removing it would make some path fall
/// back onto another one: a base whose layer reads elsewhere in the
/// section, or a layer whose base reads elsewhere in the section.
fn prune_empty_witnesses(graph: &mut CollationGraph, start: ReadingId, end: ReadingId) {
    let Some(direct) = graph.find_edge(start, end, EdgeKind::Sequence) else {
        return;
    };
    if graph.outgoing_sequence(start).count() < 2 {
        return;
    }
    let Some(edge) = graph.edge(direct) else {
        return;
    };

    let elsewhere: BTreeSet<Sigil> = traverse_from(graph, start)
        .into_iter()
        .flat_map(|id| graph.outgoing_sequence(id).filter(|e| e.id != direct).collect::<Vec<_>>())
        .flat_map(|e| e.witnesses.iter().cloned())
        .collect();
    let layered_bases: BTreeSet<Sigil> = elsewhere.iter().filter(|w| w.is_layer()).map(Sigil::to_base).collect();

    let (keep, pruned): (BTreeSet<Sigil>, BTreeSet<Sigil>) = edge.witnesses.iter().cloned().partition(|w| {
        if w.is_layer() {
            elsewhere.contains(&w.to_base())
        } else {
            layered_bases.contains(w)
        }
    });
    if pruned.is_empty() {
        return;
    }

    debug!(start = %start, end = %end, pruned = pruned.len(), kept = keep.len(), "Pruned empty witnesses");
    if let Some(edge) = graph.remove_edge(direct) {
        if !keep.is_empty() {
            graph.link(start, end, EdgeKind::Sequence, keep, edge.metadata);
        }
    }
}

/// Re-link every witness through `placeholder` from its predecessor to its
/// successor, then delete the placeholder.
///
/// A sigil arriving on one side but not the other follows its base
/// witness's edge on the missing side.
fn remove_placeholder(graph: &mut CollationGraph, section: SectionId, placeholder: ReadingId) -> Result<()> {
    let incoming: Vec<(ReadingId, BTreeSet<Sigil>)> = graph
        .incoming_sequence(placeholder)
        .map(|e| (e.from, e.witnesses.clone()))
        .collect();
    let outgoing: Vec<(ReadingId, BTreeSet<Sigil>)> = graph
        .outgoing_sequence(placeholder)
        .map(|e| (e.to, e.witnesses.clone()))
        .collect();

    let carrier = |side: &[(ReadingId, BTreeSet<Sigil>)], sigil: &Sigil| -> Option<ReadingId> {
        side.iter()
            .find(|(_, w)| w.contains(sigil))
            .or_else(|| {
                sigil
                    .is_layer()
                    .then(|| side.iter().find(|(_, w)| w.contains(&sigil.to_base())))
                    .flatten()
            })
            .map(|(id, _)| *id)
    };

    let mut links: BTreeMap<(ReadingId, ReadingId), BTreeSet<Sigil>> = BTreeMap::new();
    let sigils: BTreeSet<&Sigil> = incoming
        .iter()
        .chain(outgoing.iter())
        .flat_map(|(_, w)| w.iter())
        .collect();
    for sigil in sigils {
        match (carrier(&incoming, sigil), carrier(&outgoing, sigil)) {
            (Some(from), Some(to)) => {
                links.entry((from, to)).or_default().insert(sigil.clone());
            }
            (from, _) => {
                let side = if from.is_none() { "incoming" } else { "outgoing" };
                warn!(placeholder = %placeholder, sigil = %sigil, side, "Witness path breaks at placeholder");
                return Err(CollationError::invariant(
                    section,
                    format!("witness {} has no {} edge at placeholder {}", sigil, side, placeholder),
                ));
            }
        }
    }

    for ((from, to), witnesses) in links {
        graph.link(from, to, EdgeKind::Sequence, witnesses, BTreeMap::new());
    }
    graph.remove_reading(placeholder);
    debug!(placeholder = %placeholder, "Removed placeholder");
    Ok(())
}
