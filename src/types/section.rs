//! Section metadata.

use serde::{Deserialize, Serialize};

use super::reading::{ReadingId, SectionId};

/// A bounded chunk of the tradition's collation graph.
///
/// The section's readings are everything reachable from `start` along
/// sequence edges; they are not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    /// Section identifier.
    pub id: SectionId,
    /// Display name.
    pub name: String,
    /// Language of the section's text, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// The unique start reading.
    pub start: ReadingId,
    /// The unique end reading.
    pub end: ReadingId,
}
