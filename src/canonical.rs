//! Canonical serialization for deterministic fingerprints.
//!
//! Flattened tables and graph snapshots are fingerprinted so that two runs
//! over an unchanged graph can be compared byte for byte.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable collection order: only `Vec`, `BTreeMap` and `BTreeSet` appear
//!   in fingerprinted data
//! - The graph serializes through its flat id-ordered form

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Seed for every fingerprint in this crate.
pub const FINGERPRINT_SEED: u64 = 0;

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Compute the xxh64 fingerprint of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> serde_json::Result<u64> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, FINGERPRINT_SEED))
}

/// Compute the fingerprint as a 16-character hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CollationGraph;
    use crate::types::Sigil;

    #[test]
    fn test_determinism() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let r = graph.add_reading(s, "word", Some(1)).unwrap();
        graph.add_witness_path(s, &Sigil::base("A"), &[r]).unwrap();

        let h1 = canonical_hash_hex(&graph).unwrap();
        let h2 = canonical_hash_hex(&graph.clone()).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_content_changes_fingerprint() {
        let mut graph = CollationGraph::new();
        let s = graph.add_section("one");
        let before = canonical_hash(&graph).unwrap();
        graph.add_reading(s, "word", Some(1)).unwrap();
        assert_ne!(before, canonical_hash(&graph).unwrap());
    }
}
