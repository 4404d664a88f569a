//! Collator configuration.
//!
//! ## Environment
//!
//! - `COLLATION_VERIFY_INVARIANTS`: check touched sections before commit
//!   (`true`/`false`/`1`/`0`, default: true)
//! - `COLLATION_SPLIT_SUFFIX`: appended to a section's name to name the
//!   section split off from it (default: `" split"`)

use serde::{Deserialize, Serialize};

/// Default suffix for the name of a split-off section.
pub const DEFAULT_SPLIT_SUFFIX: &str = " split";

/// Configuration for a [`Collator`](crate::collator::Collator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollatorConfig {
    /// Run the invariant checker on every touched section before commit.
    pub verify_invariants: bool,
    /// Suffix for the name of the section created by a split.
    pub split_name_suffix: String,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            verify_invariants: true,
            split_name_suffix: DEFAULT_SPLIT_SUFFIX.to_string(),
        }
    }
}

impl CollatorConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup over the defaults.
    ///
    /// Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            verify_invariants: lookup("COLLATION_VERIFY_INVARIANTS")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.verify_invariants),
            split_name_suffix: lookup("COLLATION_SPLIT_SUFFIX").unwrap_or(defaults.split_name_suffix),
        }
    }

    /// Skip invariant checks.
    pub fn without_verification(mut self) -> Self {
        self.verify_invariants = false;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
