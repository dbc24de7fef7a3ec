//! Approximate per-track chromosome spans used to prune tracks before any
//! expensive fetch.
//!
//! The index is a lossy summary: it is derived from the first record in a
//! small prefix of each file, extended by a fixed window. It can only say
//! "this track cannot overlap", never "this track overlaps".
//!
//! Persisted as a single JSON document:
//!
//! ```json
//! {"NGEN000001": {"1": [10468, 10010468]}}
//! ```

mod builder;

pub use builder::{BoundaryIndexBuilder, BoundaryOptions, BuildSummary, track_bounds};

use crate::types::{GenomicRange, normalize_chrom};
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Normalized chromosome -> `[approx_min, approx_max]`
pub type ChromBounds = BTreeMap<String, [u64; 2]>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BoundaryIndex {
    entries: BTreeMap<String, ChromBounds>,
}

/// Outcome of consulting the index for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prune {
    /// The approximate span overlaps the query
    Keep,
    /// No information about this track
    Unindexed,
    /// The track has no span on the query chromosome
    OtherChromosome,
    /// The span on the query chromosome lies outside the query
    OutsideSpan,
}

impl BoundaryIndex {
    /// Load a persisted index; a missing file is [`Error::IndexMissing`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexMissing(format!(
                "boundary index {} does not exist",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.entries.contains_key(track_id)
    }

    pub fn get(&self, track_id: &str) -> Option<&ChromBounds> {
        self.entries.get(track_id)
    }

    /// Add spans for a track. Spans already recorded are left untouched.
    pub fn insert(&mut self, track_id: impl Into<String>, chrom: &str, bounds: [u64; 2]) {
        self.entries
            .entry(track_id.into())
            .or_default()
            .entry(normalize_chrom(chrom))
            .or_insert(bounds);
    }

    /// Add every track of `other` that this index does not know yet.
    pub fn merge(&mut self, other: BoundaryIndex) {
        for (track_id, bounds) in other.entries {
            self.entries.entry(track_id).or_insert(bounds);
        }
    }

    /// Decide whether `track_id` can possibly overlap `range`.
    ///
    /// The span check is inclusive on both ends, so a track is only dropped
    /// when its recorded span is strictly before or after the query.
    pub fn prune(&self, track_id: &str, range: &GenomicRange) -> Prune {
        let Some(bounds) = self.entries.get(track_id) else {
            return Prune::Unindexed;
        };
        let Some(&[min, max]) = bounds.get(range.chrom_key()) else {
            return Prune::OtherChromosome;
        };
        if range.end < min || range.start > max {
            Prune::OutsideSpan
        } else {
            Prune::Keep
        }
    }
}

impl<'de> Deserialize<'de> for BoundaryIndex {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Older indexes kept case-sensitive labels ("X"); fold them into
        // the normalized form so lookups match queries.
        let raw = BTreeMap::<String, ChromBounds>::deserialize(deserializer)?;
        let mut index = BoundaryIndex::default();
        for (track_id, bounds) in raw {
            for (chrom, span) in bounds {
                index.insert(track_id.clone(), &chrom, span);
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(chrom: &str, start: u64, end: u64) -> GenomicRange {
        GenomicRange::new(chrom, start, end).unwrap()
    }

    #[test]
    fn test_prune_decisions() {
        let mut index = BoundaryIndex::default();
        index.insert("A", "chr1", [500, 1500]);
        index.insert("B", "chr2", [0, 5000]);
        index.insert("C", "chr3", [0, 100]);

        let query = range("chr1", 1000, 2000);
        assert_eq!(index.prune("A", &query), Prune::Keep);
        assert_eq!(index.prune("B", &query), Prune::OtherChromosome);
        assert_eq!(index.prune("C", &query), Prune::OtherChromosome);
        assert_eq!(index.prune("D", &query), Prune::Unindexed);

        assert_eq!(index.prune("A", &range("1", 1600, 1700)), Prune::OutsideSpan);
        assert_eq!(index.prune("A", &range("1", 0, 400)), Prune::OutsideSpan);
    }

    #[test]
    fn test_prune_never_drops_true_overlap() {
        let mut index = BoundaryIndex::default();
        index.insert("T", "1", [1000, 2000]);

        for start in (0..3000).step_by(37) {
            for len in [1, 5, 100, 999] {
                let query = range("chr1", start, start + len);
                if crate::types::overlaps(start, start + len, 1000, 2000) {
                    assert_eq!(index.prune("T", &query), Prune::Keep);
                }
            }
        }
    }

    #[test]
    fn test_insert_keeps_existing() {
        let mut index = BoundaryIndex::default();
        index.insert("A", "chr1", [10, 20]);
        index.insert("A", "1", [99, 100]);
        index.insert("A", "chr2", [5, 6]);
        assert_eq!(index.get("A").unwrap()["1"], [10, 20]);
        assert_eq!(index.get("A").unwrap()["2"], [5, 6]);
    }

    #[test]
    fn test_merge_adds_only_new_tracks() {
        let mut index = BoundaryIndex::default();
        index.insert("A", "1", [10, 20]);

        let mut other = BoundaryIndex::default();
        other.insert("A", "1", [0, 1]);
        other.insert("B", "2", [0, 1]);

        index.merge(other);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("A").unwrap()["1"], [10, 20]);
    }

    #[test]
    fn test_load_normalizes_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track_boundaries.json");
        std::fs::write(&path, r#"{"T1": {"X": [5, 10000005]}, "T2": {"chr7": [1, 2]}}"#).unwrap();

        let index = BoundaryIndex::load(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.prune("T1", &range("chrX", 0, 10)), Prune::Keep);
        assert_eq!(index.prune("T2", &range("7", 0, 10)), Prune::Keep);
    }

    #[test]
    fn test_load_missing_is_index_missing() {
        let err = BoundaryIndex::load(Path::new("/nonexistent/track_boundaries.json")).unwrap_err();
        assert!(matches!(err, Error::IndexMissing(_)));
    }
}
