//! Core types for the collation graph.

pub mod reading;
pub mod sigil;
pub mod edge;
pub mod section;

pub use reading::{Rank, Reading, ReadingId, SectionId, TraditionId};
pub use sigil::{Sigil, SigilParseError};
pub use edge::{EdgeId, EdgeKind, RelationEdge, SequenceEdge};
pub use section::SectionInfo;
