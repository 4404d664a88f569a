//! Alignment flattener: sections to a witness × position table.
//!
//! ## Per section
//!
//! One row per content rank (`1 ..= end_rank - 1`) and one column per
//! witness sigil carried in the section. Each column walks its witness path
//! and drops the reading at its rank; ranks the witness skips are gaps.
//!
//! ## Whole tradition
//!
//! The column set is the union of every section's sigils, sorted by their
//! display form. A section lacking a column lends its base witness's column
//! if it has one; otherwise that slice is filled with absence markers.
//! Rows are the section rows concatenated in the order given.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::canonical_hash_hex;
use crate::error::{CollationError, Result};
use crate::graph::traversal::{section_end, section_readings, witness_path, witnesses_of_section};
use crate::graph::CollationGraph;
use crate::types::{Rank, Reading, ReadingId, SectionId, Sigil};

/// Whether witness layers get their own columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPolicy {
    /// One column per sigil, layers included.
    #[default]
    Keep,
    /// Base witnesses only.
    Collapse,
}

/// Flattening policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenOptions {
    /// Layer column handling.
    #[serde(default)]
    pub layers: LayerPolicy,
    /// Relation type whose linked readings are shown as one form.
    #[serde(default)]
    pub conflate: Option<String>,
}

impl FlattenOptions {
    /// Collapse layer columns.
    pub fn collapse_layers(mut self) -> Self {
        self.layers = LayerPolicy::Collapse;
        self
    }

    /// Conflate readings linked by `relation_type`.
    pub fn conflate(mut self, relation_type: impl Into<String>) -> Self {
        self.conflate = Some(relation_type.into());
        self
    }
}

/// The reading shown in one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Reading shown (the representative when conflating).
    pub reading: ReadingId,
    /// Display text.
    pub text: String,
    /// Normal form, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_form: Option<String>,
    /// Rank of the reading.
    pub rank: Rank,
}

impl Token {
    fn from_reading(reading: &Reading, rank: Rank) -> Self {
        Self {
            reading: reading.id,
            text: reading.text.clone(),
            normal_form: reading.normal_form.clone(),
            rank,
        }
    }

    /// Normal form if present, else the display text.
    pub fn normalized(&self) -> &str {
        self.normal_form.as_deref().unwrap_or(&self.text)
    }
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    /// The witness reads this token here.
    Reading(Token),
    /// The witness is in the section but has nothing at this rank.
    Gap,
    /// The witness is not in the section at all.
    Absent,
}

impl Cell {
    /// Text for export; `None` for gaps and absences.
    pub fn display(&self) -> Option<&str> {
        match self {
            Cell::Reading(token) => Some(token.normalized()),
            Cell::Gap | Cell::Absent => None,
        }
    }
}

/// Alignment of a single section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTable {
    /// Section flattened.
    pub section: SectionId,
    /// Number of rows.
    pub length: usize,
    /// Column per sigil.
    pub columns: BTreeMap<Sigil, Vec<Cell>>,
}

impl SectionTable {
    /// The column for `sigil`, falling back to its base witness.
    pub fn column_for(&self, sigil: &Sigil) -> Option<&Vec<Cell>> {
        self.columns
            .get(sigil)
            .or_else(|| if sigil.is_layer() { self.columns.get(&sigil.to_base()) } else { None })
    }
}

/// One witness column of the tradition-wide table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column sigil.
    pub sigil: Sigil,
    /// One cell per row.
    pub cells: Vec<Cell>,
}

/// Tradition-wide alignment table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentTable {
    /// Sections included, in row order.
    pub sections: Vec<SectionId>,
    /// Columns sorted by sigil display form.
    pub columns: Vec<Column>,
    /// Number of rows.
    pub length: usize,
}

impl AlignmentTable {
    /// Column headers.
    pub fn sigils(&self) -> impl Iterator<Item = &Sigil> {
        self.columns.iter().map(|c| &c.sigil)
    }

    /// Column by sigil.
    pub fn column(&self, sigil: &Sigil) -> Option<&Column> {
        self.columns.iter().find(|c| &c.sigil == sigil)
    }

    /// Cells of row `index`, one per column.
    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.length {
            return None;
        }
        self.columns.iter().map(|c| c.cells.get(index)).collect()
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.length).filter_map(|i| self.row(i))
    }

    /// Deterministic xxh64 fingerprint of the table.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        canonical_hash_hex(self)
    }
}

/// Flatten one section.
pub fn section_table(graph: &CollationGraph, section: SectionId, options: &FlattenOptions) -> Result<SectionTable> {
    let end = section_end(graph, section)?;
    let end_rank = graph
        .require_reading(end)?
        .rank
        .ok_or_else(|| CollationError::invariant(section, format!("end {} has no rank", end)))?;
    let length = end_rank.saturating_sub(1) as usize;

    let representatives = match &options.conflate {
        Some(relation_type) => conflation_map(graph, section, relation_type)?,
        None => HashMap::new(),
    };

    let mut columns = BTreeMap::new();
    for sigil in witnesses_of_section(graph, section)? {
        if options.layers == LayerPolicy::Collapse && sigil.is_layer() {
            continue;
        }
        let mut cells = vec![Cell::Gap; length];
        for id in witness_path(graph, section, &sigil)? {
            let reading = graph.require_reading(id)?;
            if reading.is_boundary() {
                continue;
            }
            let Some(rank) = reading.rank.filter(|r| (1..end_rank).contains(r)) else {
                return Err(CollationError::invariant(
                    section,
                    format!("{} has rank {:?} outside 1..{}", id, reading.rank, end_rank),
                ));
            };
            let shown = representatives
                .get(&id)
                .and_then(|rep| graph.reading(*rep))
                .unwrap_or(reading);
            cells[(rank - 1) as usize] = Cell::Reading(Token::from_reading(shown, rank));
        }
        columns.insert(sigil, cells);
    }

    debug!(section = %section, rows = length, columns = columns.len(), "Flattened section");
    Ok(SectionTable { section, length, columns })
}

/// Flatten `sections` in the given order into one table.
pub fn flatten(graph: &CollationGraph, sections: &[SectionId], options: &FlattenOptions) -> Result<AlignmentTable> {
    let tables = sections
        .iter()
        .map(|s| section_table(graph, *s, options))
        .collect::<Result<Vec<_>>>()?;

    let mut sigils: Vec<Sigil> = tables
        .iter()
        .flat_map(|t| t.columns.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    sigils.sort_by_key(|s| s.to_string());

    let length: usize = tables.iter().map(|t| t.length).sum();
    let columns: Vec<Column> = sigils
        .into_iter()
        .map(|sigil| {
            let mut cells = Vec::with_capacity(length);
            for table in &tables {
                match table.column_for(&sigil) {
                    Some(column) => cells.extend(column.iter().cloned()),
                    None => cells.extend(std::iter::repeat(Cell::Absent).take(table.length)),
                }
            }
            Column { sigil, cells }
        })
        .collect();

    debug!(sections = sections.len(), rows = length, columns = columns.len(), "Flattened tradition");
    Ok(AlignmentTable {
        sections: sections.to_vec(),
        columns,
        length,
    })
}

/// Map each conflated reading to the first reading (in traversal order) of
/// its relation component.
fn conflation_map(
    graph: &CollationGraph,
    section: SectionId,
    relation_type: &str,
) -> Result<HashMap<ReadingId, ReadingId>> {
    let order = section_readings(graph, section)?;
    let members: BTreeSet<ReadingId> = order.iter().copied().collect();

    let mut neighbours: HashMap<ReadingId, Vec<ReadingId>> = HashMap::new();
    for relation in graph.relations().filter(|r| r.relation_type == relation_type) {
        if members.contains(&relation.source) && members.contains(&relation.target) {
            neighbours.entry(relation.source).or_default().push(relation.target);
            neighbours.entry(relation.target).or_default().push(relation.source);
        }
    }

    let mut representative: HashMap<ReadingId, ReadingId> = HashMap::new();
    for root in order {
        if representative.contains_key(&root) || !neighbours.contains_key(&root) {
            continue;
        }
        let mut queue = VecDeque::from([root]);
        representative.insert(root, root);
        while let Some(current) = queue.pop_front() {
            for next in neighbours.get(&current).into_iter().flatten() {
                if !representative.contains_key(next) {
                    representative.insert(*next, root);
                    queue.push_back(*next);
                }
            }
        }
    }
    Ok(representative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::assign_ranks;

    fn cell_text(cell: &Cell) -> Option<&str> {
        match cell {
            Cell::Reading(token) => Some(token.text.as_str()),
            _ => None,
        }
    }

    /// A: the cat sat; B: the sat
    fn build_one() -> (CollationGraph, SectionId) {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let the = graph.add_reading(s, "the", None).unwrap();
        let cat = graph.add_reading(s, "cat", None).unwrap();
        let sat = graph.add_reading(s, "sat", None).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[the, cat, sat]).unwrap();
        graph.add_witness_path(s, &Sigil::base("B"), &[the, sat]).unwrap();
        assign_ranks(&mut graph, s).unwrap();
        (graph, s)
    }

    #[test]
    fn test_section_table_marks_gaps() {
        let (graph, s) = build_one();
        let table = section_table(&graph, s, &FlattenOptions::default()).unwrap();

        assert_eq!(table.length, 3);
        let b = &table.columns[&Sigil::base("B")];
        assert_eq!(cell_text(&b[0]), Some("the"));
        assert_eq!(b[1], Cell::Gap);
        assert_eq!(cell_text(&b[2]), Some("sat"));
    }

    #[test]
    fn test_display_prefers_normal_form() {
        let (mut graph, s) = build_one();
        let cat = graph.readings().find(|r| r.text == "cat").map(|r| r.id).unwrap();
        graph.set_normal_form(cat, "Cat").unwrap();

        let table = section_table(&graph, s, &FlattenOptions::default()).unwrap();
        let a = &table.columns[&Sigil::base("A")];
        let Cell::Reading(token) = &a[1] else {
            panic!("expected a reading, got {:?}", a[1]);
        };
        assert_eq!(token.text, "cat");
        assert_eq!(token.normal_form.as_deref(), Some("Cat"));
        assert_eq!(token.normalized(), "Cat");
        assert_eq!(a[1].display(), Some("Cat"));

        // No normal form falls back to the text
        assert_eq!(a[0].display(), Some("the"));
        assert_eq!(table.columns[&Sigil::base("B")][1].display(), None);
        assert_eq!(Cell::Absent.display(), None);
    }

    #[test]
    fn test_set_normal_form_unknown_reading() {
        let mut graph = CollationGraph::new();
        let err = graph.set_normal_form(ReadingId::new(42), "x").unwrap_err();
        assert_eq!(err, CollationError::ReadingNotFound(ReadingId::new(42)));
    }

    #[test]
    fn test_layer_column_and_collapse() {
        let (mut graph, s) = build_one();
        let dog = graph.add_reading(s, "dog", None).unwrap();
        let layer = Sigil::layered("A", "c");
        let ids: BTreeMap<String, ReadingId> = graph.readings().map(|r| (r.text.clone(), r.id)).collect();
        graph.add_witness_link(ids["the"], dog, layer.clone()).unwrap();
        graph.add_witness_link(dog, ids["sat"], layer.clone()).unwrap();
        assign_ranks(&mut graph, s).unwrap();

        let kept = section_table(&graph, s, &FlattenOptions::default()).unwrap();
        assert_eq!(cell_text(&kept.columns[&layer][1]), Some("dog"));
        assert_eq!(cell_text(&kept.columns[&Sigil::base("A")][1]), Some("cat"));

        let collapsed = section_table(&graph, s, &FlattenOptions::default().collapse_layers()).unwrap();
        assert!(!collapsed.columns.contains_key(&layer));
        assert_eq!(collapsed.columns.len(), 2);
    }

    #[test]
    fn test_conflation_shows_representative() {
        let (mut graph, s) = build_one();
        let ids: BTreeMap<String, ReadingId> = graph.readings().map(|r| (r.text.clone(), r.id)).collect();
        let kat = graph.add_reading(s, "kat", None).unwrap();
        let c = Sigil::base("C");
        graph.add_witness_path(s, &c, &[ids["the"], kat, ids["sat"]]).unwrap();
        graph.add_relation(ids["cat"], kat, "spelling").unwrap();
        assign_ranks(&mut graph, s).unwrap();

        let plain = section_table(&graph, s, &FlattenOptions::default()).unwrap();
        assert_eq!(cell_text(&plain.columns[&c][1]), Some("kat"));

        let conflated = section_table(&graph, s, &FlattenOptions::default().conflate("spelling")).unwrap();
        assert_eq!(cell_text(&conflated.columns[&c][1]), Some("cat"));

        let other = section_table(&graph, s, &FlattenOptions::default().conflate("grammatical")).unwrap();
        assert_eq!(cell_text(&other.columns[&c][1]), Some("kat"));
    }

    #[test]
    fn test_flatten_empty_list() {
        let (graph, _) = build_one();
        let table = flatten(&graph, &[], &FlattenOptions::default()).unwrap();
        assert_eq!(table.length, 0);
        assert!(table.columns.is_empty());
        assert!(table.row(0).is_none());
    }

    #[test]
    fn test_rows_align_with_columns() {
        let (graph, s) = build_one();
        let table = flatten(&graph, &[s], &FlattenOptions::default()).unwrap();
        let rows: Vec<Vec<Option<&str>>> = table
            .rows()
            .map(|row| row.into_iter().map(Cell::display).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![Some("the"), Some("the")],
                vec![Some("cat"), None],
                vec![Some("sat"), Some("sat")],
            ]
        );
    }
}
