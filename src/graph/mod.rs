//! The witness-annotated collation graph.
//!
//! `CollationGraph` is an arena: readings, sequence edges and sections live
//! in ordered maps keyed by stable integer ids, and every mutation is an
//! insert or remove on those maps. Adjacency is kept as per-reading sets of
//! edge ids in both directions, so a removed edge can never be followed.
//!
//! Uses BTreeMap/BTreeSet throughout for deterministic iteration order.

pub mod traversal;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CollationError, Result};
use crate::types::{
    EdgeId, EdgeKind, Rank, Reading, ReadingId, RelationEdge, SectionId, SectionInfo,
    SequenceEdge, Sigil,
};

/// Arena-backed collation graph for one tradition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphData", into = "GraphData")]
pub struct CollationGraph {
    readings: BTreeMap<ReadingId, Reading>,
    edges: BTreeMap<EdgeId, SequenceEdge>,
    /// Reading -> outgoing edge ids.
    outgoing: BTreeMap<ReadingId, BTreeSet<EdgeId>>,
    /// Reading -> incoming edge ids.
    incoming: BTreeMap<ReadingId, BTreeSet<EdgeId>>,
    relations: BTreeSet<RelationEdge>,
    sections: BTreeMap<SectionId, SectionInfo>,
    /// Tradition-level section chain.
    section_order: Vec<SectionId>,
    next_reading: u32,
    next_edge: u32,
    next_section: u32,
}

/// Flat serialised form of a [`CollationGraph`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    /// All readings.
    pub readings: Vec<Reading>,
    /// All sequence and lemma-text edges.
    pub edges: Vec<SequenceEdge>,
    /// All relation edges.
    #[serde(default)]
    pub relations: Vec<RelationEdge>,
    /// Section metadata.
    pub sections: Vec<SectionInfo>,
    /// Section ids in tradition order.
    pub section_order: Vec<SectionId>,
}

impl CollationGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch a reading by id.
    pub fn reading(&self, id: ReadingId) -> Option<&Reading> {
        self.readings.get(&id)
    }

    /// Fetch a reading, failing with `ReadingNotFound`.
    pub fn require_reading(&self, id: ReadingId) -> Result<&Reading> {
        self.readings.get(&id).ok_or(CollationError::ReadingNotFound(id))
    }

    /// Fetch an edge by id.
    pub fn edge(&self, id: EdgeId) -> Option<&SequenceEdge> {
        self.edges.get(&id)
    }

    /// All readings in id order.
    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        self.readings.values()
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &SequenceEdge> {
        self.edges.values()
    }

    /// All relation edges in canonical order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationEdge> {
        self.relations.iter()
    }

    /// Number of readings.
    pub fn num_readings(&self) -> usize {
        self.readings.len()
    }

    /// Number of sequence and lemma-text edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing edges of any kind, ordered by edge id.
    pub fn outgoing(&self, id: ReadingId) -> impl Iterator<Item = &SequenceEdge> {
        self.outgoing
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Incoming edges of any kind, ordered by edge id.
    pub fn incoming(&self, id: ReadingId) -> impl Iterator<Item = &SequenceEdge> {
        self.incoming
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Outgoing witness sequence edges.
    pub fn outgoing_sequence(&self, id: ReadingId) -> impl Iterator<Item = &SequenceEdge> {
        self.outgoing(id).filter(|e| e.is_sequence())
    }

    /// Incoming witness sequence edges.
    pub fn incoming_sequence(&self, id: ReadingId) -> impl Iterator<Item = &SequenceEdge> {
        self.incoming(id).filter(|e| e.is_sequence())
    }

    /// Find the edge of the given kind between two readings.
    pub fn find_edge(&self, from: ReadingId, to: ReadingId, kind: EdgeKind) -> Option<EdgeId> {
        self.outgoing(from)
            .find(|e| e.to == to && e.kind == kind)
            .map(|e| e.id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Section registry
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch section metadata.
    pub fn section(&self, id: SectionId) -> Option<&SectionInfo> {
        self.sections.get(&id)
    }

    /// Fetch section metadata, failing with `SectionNotFound`.
    pub fn require_section(&self, id: SectionId) -> Result<&SectionInfo> {
        self.sections.get(&id).ok_or(CollationError::SectionNotFound(id))
    }

    /// The section's start reading, if the section and reading exist.
    pub fn start_of(&self, section: SectionId) -> Option<ReadingId> {
        self.sections
            .get(&section)
            .map(|s| s.start)
            .filter(|id| self.readings.contains_key(id))
    }

    /// The section's end reading, if the section and reading exist.
    pub fn end_of(&self, section: SectionId) -> Option<ReadingId> {
        self.sections
            .get(&section)
            .map(|s| s.end)
            .filter(|id| self.readings.contains_key(id))
    }

    /// Section ids in tradition order.
    pub fn sections_in_order(&self) -> &[SectionId] {
        &self.section_order
    }

    /// The section directly after `section` in tradition order.
    pub fn next_section(&self, section: SectionId) -> Option<SectionId> {
        let pos = self.section_order.iter().position(|s| *s == section)?;
        self.section_order.get(pos + 1).copied()
    }

    /// The section directly before `section` in tradition order.
    pub fn prior_section(&self, section: SectionId) -> Option<SectionId> {
        let pos = self.section_order.iter().position(|s| *s == section)?;
        pos.checked_sub(1).and_then(|p| self.section_order.get(p).copied())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Construction (importer-facing)
    // ─────────────────────────────────────────────────────────────────────

    /// Append a new section with fresh start and end readings.
    ///
    /// The end reading is unranked until the section is ranked.
    pub fn add_section(&mut self, name: impl Into<String>) -> SectionId {
        let id = self.alloc_section_id();
        let start = self.alloc_reading_id();
        let end = self.alloc_reading_id();
        self.readings.insert(start, Reading::start(start, id));
        self.readings.insert(end, Reading::end(end, id, None));
        self.sections.insert(
            id,
            SectionInfo {
                id,
                name: name.into(),
                language: None,
                start,
                end,
            },
        );
        self.section_order.push(id);
        id
    }

    /// Add a text reading to a section.
    pub fn add_reading(
        &mut self,
        section: SectionId,
        text: impl Into<String>,
        rank: Option<Rank>,
    ) -> Result<ReadingId> {
        self.require_section(section)?;
        let id = self.alloc_reading_id();
        self.readings.insert(id, Reading::new(id, section, text, rank));
        Ok(id)
    }

    /// Record that `sigil` reads `from` then `to`.
    ///
    /// Joins an existing sequence edge between the two readings if there is
    /// one; otherwise creates it.
    pub fn add_witness_link(&mut self, from: ReadingId, to: ReadingId, sigil: Sigil) -> Result<EdgeId> {
        self.require_reading(from)?;
        self.require_reading(to)?;
        Ok(self.link(from, to, EdgeKind::Sequence, [sigil], BTreeMap::new()))
    }

    /// Thread a witness through a section: start, `readings...`, end.
    pub fn add_witness_path(&mut self, section: SectionId, sigil: &Sigil, readings: &[ReadingId]) -> Result<()> {
        let info = self.require_section(section)?;
        let mut path = Vec::with_capacity(readings.len() + 2);
        path.push(info.start);
        path.extend_from_slice(readings);
        path.push(info.end);
        for pair in path.windows(2) {
            self.add_witness_link(pair[0], pair[1], sigil.clone())?;
        }
        Ok(())
    }

    /// Add a lemma-text link.
    pub fn add_lemma_link(&mut self, from: ReadingId, to: ReadingId) -> Result<EdgeId> {
        self.require_reading(from)?;
        self.require_reading(to)?;
        Ok(self.link(from, to, EdgeKind::LemmaText, [], BTreeMap::new()))
    }

    /// Add a relation edge between two readings.
    pub fn add_relation(
        &mut self,
        source: ReadingId,
        target: ReadingId,
        relation_type: impl Into<String>,
    ) -> Result<()> {
        self.require_reading(source)?;
        self.require_reading(target)?;
        self.relations.insert(RelationEdge::new(source, target, relation_type));
        Ok(())
    }

    /// Set the normal form of a reading.
    pub fn set_normal_form(&mut self, id: ReadingId, normal_form: impl Into<String>) -> Result<()> {
        let reading = self.readings.get_mut(&id).ok_or(CollationError::ReadingNotFound(id))?;
        reading.normal_form = Some(normal_form.into());
        Ok(())
    }

    /// Set the language recorded on a section.
    pub fn set_section_language(&mut self, id: SectionId, language: impl Into<String>) -> Result<()> {
        let section = self.sections.get_mut(&id).ok_or(CollationError::SectionNotFound(id))?;
        section.language = Some(language.into());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Crate-internal mutation primitives
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn reading_mut(&mut self, id: ReadingId) -> Option<&mut Reading> {
        self.readings.get_mut(&id)
    }

    pub(crate) fn section_mut(&mut self, id: SectionId) -> Option<&mut SectionInfo> {
        self.sections.get_mut(&id)
    }

    /// Insert a reading built by `make` under a fresh id.
    pub(crate) fn insert_reading(&mut self, make: impl FnOnce(ReadingId) -> Reading) -> ReadingId {
        let id = self.alloc_reading_id();
        self.readings.insert(id, make(id));
        id
    }

    /// Create or extend the edge `from -> to` of `kind`.
    ///
    /// Edges with the same endpoints and kind are coalesced: witnesses and
    /// metadata are unioned into the existing edge.
    pub(crate) fn link(
        &mut self,
        from: ReadingId,
        to: ReadingId,
        kind: EdgeKind,
        witnesses: impl IntoIterator<Item = Sigil>,
        metadata: BTreeMap<String, String>,
    ) -> EdgeId {
        if let Some(existing) = self.find_edge(from, to, kind) {
            if let Some(edge) = self.edges.get_mut(&existing) {
                edge.witnesses.extend(witnesses);
                edge.metadata.extend(metadata);
            }
            return existing;
        }
        let id = EdgeId::new(self.next_edge);
        self.next_edge += 1;
        let mut edge = SequenceEdge::new(id, from, to, kind);
        edge.witnesses.extend(witnesses);
        edge.metadata = metadata;
        self.attach(edge);
        id
    }

    /// Remove an edge and its adjacency entries.
    pub(crate) fn remove_edge(&mut self, id: EdgeId) -> Option<SequenceEdge> {
        let edge = self.edges.remove(&id)?;
        if let Some(set) = self.outgoing.get_mut(&edge.from) {
            set.remove(&id);
            if set.is_empty() {
                self.outgoing.remove(&edge.from);
            }
        }
        if let Some(set) = self.incoming.get_mut(&edge.to) {
            set.remove(&id);
            if set.is_empty() {
                self.incoming.remove(&edge.to);
            }
        }
        Some(edge)
    }

    /// Remove a reading together with every edge and relation touching it.
    pub(crate) fn remove_reading(&mut self, id: ReadingId) -> Option<Reading> {
        let reading = self.readings.remove(&id)?;
        let touching: Vec<EdgeId> = self
            .outgoing
            .remove(&id)
            .into_iter()
            .flatten()
            .chain(self.incoming.remove(&id).into_iter().flatten())
            .collect();
        for edge in touching {
            self.remove_edge(edge);
        }
        self.relations.retain(|r| !r.touches(id));
        Some(reading)
    }

    pub(crate) fn insert_section(&mut self, name: String, language: Option<String>, start: ReadingId, end: ReadingId) -> SectionId {
        let id = self.alloc_section_id();
        self.sections.insert(
            id,
            SectionInfo {
                id,
                name,
                language,
                start,
                end,
            },
        );
        id
    }

    pub(crate) fn remove_section_info(&mut self, id: SectionId) -> Option<SectionInfo> {
        self.detach_from_order(id);
        self.sections.remove(&id)
    }

    /// Place `section` directly after `prior`, or first when `prior` is `None`.
    ///
    /// The section is taken out of its current place first; the chain
    /// closes over the gap it leaves.
    pub(crate) fn place_section_after(&mut self, section: SectionId, prior: Option<SectionId>) {
        self.detach_from_order(section);
        let index = match prior {
            Some(p) => self
                .section_order
                .iter()
                .position(|s| *s == p)
                .map(|i| i + 1)
                .unwrap_or(self.section_order.len()),
            None => 0,
        };
        self.section_order.insert(index, section);
    }

    fn detach_from_order(&mut self, section: SectionId) {
        self.section_order.retain(|s| *s != section);
    }

    fn attach(&mut self, edge: SequenceEdge) {
        self.outgoing.entry(edge.from).or_default().insert(edge.id);
        self.incoming.entry(edge.to).or_default().insert(edge.id);
        self.edges.insert(edge.id, edge);
    }

    fn alloc_reading_id(&mut self) -> ReadingId {
        let id = ReadingId::new(self.next_reading);
        self.next_reading += 1;
        id
    }

    fn alloc_section_id(&mut self) -> SectionId {
        let id = SectionId::new(self.next_section);
        self.next_section += 1;
        id
    }

    /// Flatten into the serialised form.
    pub fn to_data(&self) -> GraphData {
        GraphData {
            readings: self.readings.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
            relations: self.relations.iter().cloned().collect(),
            sections: self.sections.values().cloned().collect(),
            section_order: self.section_order.clone(),
        }
    }
}

impl From<CollationGraph> for GraphData {
    fn from(graph: CollationGraph) -> Self {
        graph.to_data()
    }
}

impl TryFrom<GraphData> for CollationGraph {
    type Error = CollationError;

    fn try_from(data: GraphData) -> Result<Self> {
        let mut graph = CollationGraph::new();
        for reading in data.readings {
            graph.next_reading = graph.next_reading.max(reading.id.as_u32() + 1);
            graph.readings.insert(reading.id, reading);
        }
        for edge in data.edges {
            graph.require_reading(edge.from)?;
            graph.require_reading(edge.to)?;
            graph.next_edge = graph.next_edge.max(edge.id.as_u32() + 1);
            graph.attach(edge);
        }
        for relation in data.relations {
            graph.require_reading(relation.source)?;
            graph.require_reading(relation.target)?;
            graph.relations.insert(relation);
        }
        for section in data.sections {
            graph.next_section = graph.next_section.max(section.id.as_u32() + 1);
            graph.sections.insert(section.id, section);
        }
        for id in &data.section_order {
            graph.require_section(*id)?;
        }
        graph.section_order = data.section_order;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Sigil {
        Sigil::base("A")
    }

    #[test]
    fn test_add_section_creates_boundaries() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");

        let start = graph.start_of(s).unwrap();
        let end = graph.end_of(s).unwrap();
        assert!(graph.reading(start).unwrap().is_start);
        assert!(graph.reading(end).unwrap().is_end);
        assert_eq!(graph.sections_in_order(), &[s]);
    }

    #[test]
    fn test_witness_links_coalesce() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let r = graph.add_reading(s, "word", Some(1)).unwrap();
        let start = graph.start_of(s).unwrap();

        let e1 = graph.add_witness_link(start, r, a()).unwrap();
        let e2 = graph.add_witness_link(start, r, Sigil::base("B")).unwrap();

        assert_eq!(e1, e2);
        assert_eq!(graph.num_edges(), 1);
        assert_eq!(graph.edge(e1).unwrap().witnesses.len(), 2);
    }

    #[test]
    fn test_remove_reading_drops_edges_and_relations() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let r1 = graph.add_reading(s, "x", Some(1)).unwrap();
        let r2 = graph.add_reading(s, "y", Some(1)).unwrap();
        graph.add_witness_path(s, &a(), &[r1]).unwrap();
        graph.add_relation(r1, r2, "orthographic").unwrap();

        graph.remove_reading(r1);

        assert!(graph.reading(r1).is_none());
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(graph.relations().count(), 0);
        let start = graph.start_of(s).unwrap();
        assert_eq!(graph.outgoing(start).count(), 0);
    }

    #[test]
    fn test_unknown_lookups_are_tagged() {
        let graph = CollationGraph::new();
        assert!(graph.reading(ReadingId::new(42)).is_none());
        assert!(graph.start_of(SectionId::new(3)).is_none());
        assert_eq!(
            graph.require_section(SectionId::new(3)).unwrap_err(),
            CollationError::SectionNotFound(SectionId::new(3))
        );
    }

    #[test]
    fn test_section_order_placement() {
        let mut graph = CollationGraph::new();
        let s1 = graph.add_section("one");
        let s2 = graph.add_section("two");
        let s3 = graph.add_section("three");

        graph.place_section_after(s3, Some(s1));
        assert_eq!(graph.sections_in_order(), &[s1, s3, s2]);
        graph.place_section_after(s2, None);
        assert_eq!(graph.sections_in_order(), &[s2, s1, s3]);
        assert_eq!(graph.next_section(s1), Some(s3));
        assert_eq!(graph.prior_section(s2), None);
    }

    #[test]
    fn test_serde_round_trip_rebuilds_adjacency() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let r = graph.add_reading(s, "word", Some(1)).unwrap();
        graph.add_witness_path(s, &a(), &[r]).unwrap();

        let json = serde_json::to_string(&graph).unwrap();
        let back: CollationGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(back, graph);
        assert_eq!(back.outgoing(r).count(), 1);

        // Fresh ids continue after the loaded ones
        let mut back = back;
        let fresh = back.add_reading(s, "new", None).unwrap();
        assert!(fresh > r);
    }

    #[test]
    fn test_deserialize_rejects_dangling_edge() {
        let json = r#"{
            "readings": [],
            "edges": [{"id": 0, "from": 0, "to": 1, "kind": "sequence", "witnesses": ["A"]}],
            "sections": [],
            "section_order": []
        }"#;
        assert!(serde_json::from_str::<CollationGraph>(json).is_err());
    }
}
