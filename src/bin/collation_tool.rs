//! Collation Tool Binary
//!
//! Runs collation operations against a tradition stored as a JSON graph
//! file. Mutating commands go through the same unit of work and invariant
//! checks as the library, then write the committed graph back.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Log level filter (default: collation_tool=info,collation_graph=info)
//! - `LOG_FORMAT`: "json" for structured logs, anything else for pretty output (default: pretty)
//! - `COLLATION_VERIFY_INVARIANTS`, `COLLATION_SPLIT_SUFFIX`: see `CollatorConfig`
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features cli --bin collation_tool -- split tradition.json --section 0 --rank 4
//! cargo run --features cli --bin collation_tool -- flatten tradition.json --format csv
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use collation_graph::{
    AlignmentTable, Cell, CollationGraph, Collator, CollatorConfig, FlattenOptions, GraphStore,
    InMemoryGraphStore, Rank, SectionId, TraditionId, COLLATION_SCHEMA_VERSION,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "collation_tool=info,collation_graph=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true).with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(io::stderr))
            .init();
    }
}

#[derive(Parser)]
#[command(name = "collation_tool")]
#[command(about = "Split, merge, inspect and flatten collation graphs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sections in tradition order
    Sections {
        /// Tradition graph (JSON)
        graph: PathBuf,
    },
    /// Split a section so the readings at RANK start a new section
    Split {
        /// Tradition graph (JSON)
        graph: PathBuf,
        /// Section to split
        #[arg(long)]
        section: u32,
        /// First rank of the new section
        #[arg(long)]
        rank: String,
        /// Write the result here instead of over the input
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Merge SECOND into FIRST (SECOND must follow FIRST)
    Merge {
        /// Tradition graph (JSON)
        graph: PathBuf,
        /// Section that stays
        #[arg(long)]
        first: u32,
        /// Section merged into it
        #[arg(long)]
        second: u32,
        /// Write the result here instead of over the input
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List pairs of readings that could be merged
    Mergeable {
        /// Tradition graph (JSON)
        graph: PathBuf,
        #[command(flatten)]
        window: RankWindow,
    },
    /// List groups of identical readings
    Identical {
        /// Tradition graph (JSON)
        graph: PathBuf,
        #[command(flatten)]
        window: RankWindow,
    },
    /// Flatten sections to an alignment table
    Flatten {
        /// Tradition graph (JSON)
        graph: PathBuf,
        /// Sections to include, in order (default: all)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<u32>,
        /// Output format
        #[arg(long, value_enum, default_value_t = TableFormat::Json)]
        format: TableFormat,
        /// Drop layer columns
        #[arg(long)]
        collapse_layers: bool,
        /// Show readings linked by this relation type as one form
        #[arg(long)]
        conflate: Option<String>,
        /// CSV cell for a witness missing from a section (gaps stay empty)
        #[arg(long, default_value = "<absent>")]
        absent_marker: String,
        /// Write the table here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check every section and the section chain
    Check {
        /// Tradition graph (JSON)
        graph: PathBuf,
    },
}

#[derive(clap::Args)]
struct RankWindow {
    /// Section to scan
    #[arg(long)]
    section: u32,
    /// Lowest rank (inclusive)
    #[arg(long, default_value_t = 0)]
    lo: Rank,
    /// Highest rank (inclusive)
    #[arg(long, default_value_t = Rank::MAX)]
    hi: Rank,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableFormat {
    Json,
    Csv,
}

#[derive(Serialize)]
struct TableDocument<'a> {
    schema_version: &'static str,
    fingerprint: String,
    table: &'a AlignmentTable,
}

struct Session {
    collator: Collator<InMemoryGraphStore>,
    tradition: TraditionId,
}

impl Session {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let graph: CollationGraph = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse tradition graph {}", path.display()))?;
        info!(
            path = %path.display(),
            sections = graph.sections_in_order().len(),
            readings = graph.num_readings(),
            "Loaded tradition"
        );
        let store = Arc::new(InMemoryGraphStore::new());
        let tradition = store.insert_tradition(graph);
        Ok(Self {
            collator: Collator::new(store, CollatorConfig::from_env()),
            tradition,
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let graph = self.collator.store().snapshot(self.tradition)?;
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, graph.as_ref())?;
        writer.flush()?;
        info!(path = %path.display(), "Wrote tradition");
        Ok(())
    }
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// One row per rank. Gaps are empty cells; absences get `absent_marker`.
fn write_csv<W: Write>(table: &AlignmentTable, absent_marker: &str, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(table.sigils().map(|s| s.to_string()))?;
    for row in table.rows() {
        writer.write_record(row.into_iter().map(|cell| match cell {
            Cell::Absent => absent_marker,
            _ => cell.display().unwrap_or(""),
        }))?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sections { graph } => {
            let session = Session::open(&graph)?;
            print_json(&session.collator.sections(session.tradition)?)?;
        }
        Commands::Split {
            graph,
            section,
            rank,
            output,
        } => {
            let session = Session::open(&graph)?;
            let new_section = session
                .collator
                .split_section_at(session.tradition, SectionId::new(section), &rank)
                .with_context(|| format!("Failed to split section {} at rank {}", section, rank))?;
            session.save(output.as_deref().unwrap_or(&graph))?;
            print_json(&new_section)?;
        }
        Commands::Merge {
            graph,
            first,
            second,
            output,
        } => {
            let session = Session::open(&graph)?;
            session
                .collator
                .merge_sections(session.tradition, SectionId::new(first), SectionId::new(second))
                .with_context(|| format!("Failed to merge section {} into {}", second, first))?;
            session.save(output.as_deref().unwrap_or(&graph))?;
        }
        Commands::Mergeable { graph, window } => {
            let session = Session::open(&graph)?;
            let pairs = session.collator.mergeable_readings(
                session.tradition,
                SectionId::new(window.section),
                window.lo,
                window.hi,
            )?;
            print_json(&pairs)?;
        }
        Commands::Identical { graph, window } => {
            let session = Session::open(&graph)?;
            let groups = session.collator.identical_readings(
                session.tradition,
                SectionId::new(window.section),
                window.lo,
                window.hi,
            )?;
            print_json(&groups)?;
        }
        Commands::Flatten {
            graph,
            sections,
            format,
            collapse_layers,
            conflate,
            absent_marker,
            output,
        } => {
            let session = Session::open(&graph)?;
            let mut options = FlattenOptions::default();
            if collapse_layers {
                options = options.collapse_layers();
            }
            if let Some(relation_type) = conflate {
                options = options.conflate(relation_type);
            }
            let table = if sections.is_empty() {
                session.collator.flatten_tradition(session.tradition, &options)?
            } else {
                let ids: Vec<SectionId> = sections.into_iter().map(SectionId::new).collect();
                session.collator.flatten(session.tradition, &ids, &options)?
            };
            info!(rows = table.length, columns = table.columns.len(), "Flattened tradition");

            let mut out = output_writer(output.as_deref())?;
            match format {
                TableFormat::Json => {
                    let document = TableDocument {
                        schema_version: COLLATION_SCHEMA_VERSION,
                        fingerprint: table.fingerprint()?,
                        table: &table,
                    };
                    serde_json::to_writer_pretty(&mut out, &document)?;
                    writeln!(out)?;
                }
                TableFormat::Csv => write_csv(&table, &absent_marker, out)?,
            }
        }
        Commands::Check { graph } => {
            let session = Session::open(&graph)?;
            session
                .collator
                .check_tradition(session.tradition)
                .with_context(|| format!("{} is inconsistent", graph.display()))?;
            info!(path = %graph.display(), "Tradition is consistent");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use collation_graph::{Column, ReadingId, Sigil, Token};

    fn token(id: u32, text: &str) -> Cell {
        Cell::Reading(Token {
            reading: ReadingId::new(id),
            text: text.to_string(),
            normal_form: None,
            rank: 1,
        })
    }

    #[test]
    fn test_csv_marks_absent_witnesses() {
        let table = AlignmentTable {
            sections: vec![SectionId::new(0), SectionId::new(1)],
            columns: vec![
                Column {
                    sigil: Sigil::base("A"),
                    cells: vec![token(1, "in"), token(2, "principio")],
                },
                Column {
                    sigil: Sigil::base("B"),
                    cells: vec![Cell::Gap, Cell::Absent],
                },
                Column {
                    sigil: Sigil::layered("A", "c"),
                    cells: vec![token(3, ""), Cell::Absent],
                },
            ],
            length: 2,
        };

        let mut out = Vec::new();
        write_csv(&table, "<absent>", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        // An empty reading and a gap both stay empty; only absence is marked
        assert_eq!(text, "A,B,A (c)\nin,,\nprincipio,<absent>,<absent>\n");
    }

    #[test]
    fn test_csv_custom_absent_marker() {
        let table = AlignmentTable {
            sections: vec![SectionId::new(0)],
            columns: vec![
                Column {
                    sigil: Sigil::base("A"),
                    cells: vec![token(1, "et"), Cell::Gap],
                },
                Column {
                    sigil: Sigil::base("B"),
                    cells: vec![Cell::Absent, token(2, "verbum")],
                },
            ],
            length: 2,
        };

        let mut out = Vec::new();
        write_csv(&table, "-", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A,B\net,-\n,verbum\n");
    }
}
