use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Normalize a chromosome label for identity comparison.
///
/// Labels compare case-insensitively with any leading `chr` removed, so
/// `chr1`, `CHR1` and `1` are the same chromosome.
pub fn normalize_chrom(label: &str) -> String {
    let lower = label.trim().to_ascii_lowercase();
    match lower.strip_prefix("chr") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

/// Half-open overlap test: `[a_start, a_end)` and `[b_start, b_end)` intersect
/// when each starts before the other ends.
pub fn overlaps(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start < b_end && b_start < a_end
}

/// A validated query region on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenomicRange {
    /// Label as supplied by the caller
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    #[serde(skip)]
    key: String,
}

impl GenomicRange {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let chrom = chrom.into();
        let key = normalize_chrom(&chrom);
        if key.is_empty() {
            return Err(Error::InvalidRange("empty chromosome".to_string()));
        }
        if end <= start {
            return Err(Error::InvalidRange(format!(
                "end ({}) must be greater than start ({})",
                end, start
            )));
        }
        Ok(Self {
            chrom,
            start,
            end,
            key,
        })
    }

    /// Normalized chromosome identity
    pub fn chrom_key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        overlaps(self.start, self.end, start, end)
    }

    /// Clip `[start, end)` to this range, `None` when they do not overlap.
    pub fn intersect(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        let s = start.max(self.start);
        let e = end.min(self.end);
        (s < e).then_some((s, e))
    }
}

/// Column positions of chrom/start/end within a tab-delimited record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub chrom: usize,
    pub start: usize,
    pub end: usize,
}

impl ColumnSchema {
    pub const DEFAULT: ColumnSchema = ColumnSchema {
        chrom: 0,
        start: 1,
        end: 2,
    };

    /// Interaction tracks store the interaction span in columns 5, 6, 7
    pub const INTERACT: ColumnSchema = ColumnSchema {
        chrom: 5,
        start: 6,
        end: 7,
    };

    pub fn max_column(&self) -> usize {
        self.chrom.max(self.start).max(self.end)
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One dataset of intervals from the catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub assay: String,
    pub tissue: String,
    pub cell_type: String,
    pub source: String,
    pub url: String,
    pub schema: ColumnSchema,
}

/// Query parameters for the streaming overlap endpoint
#[derive(Debug, Deserialize)]
pub struct OverlapQuery {
    pub chr: String,
    pub start: u64,
    pub end: u64,
    #[serde(rename = "maxTracks")]
    pub max_tracks: Option<usize>,
}

/// Query parameters for the indexed overlap endpoint
#[derive(Debug, Deserialize)]
pub struct IndexedQuery {
    pub chr: String,
    pub start: u64,
    pub end: u64,
    pub tissue: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEcho {
    pub chr: String,
    pub start: u64,
    pub end: u64,
}

impl From<&GenomicRange> for QueryEcho {
    fn from(range: &GenomicRange) -> Self {
        Self {
            chr: range.chrom.clone(),
            start: range.start,
            end: range.end,
        }
    }
}

/// One raw interval matched by the streaming scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedInterval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub extra: Vec<String>,
}

/// Streaming result for one track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackHits {
    pub track_id: String,
    pub track_name: String,
    pub assay: String,
    pub overlap_count: usize,
    /// False when a work cap ended the scan before the region was passed
    pub complete: bool,
    pub results: Vec<MatchedInterval>,
}

#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub query: QueryEcho,
    pub tracks_indexed_as_candidates: usize,
    pub total_tracks_found: usize,
    pub failed_tracks: usize,
    pub results: Vec<TrackHits>,
}

/// Coverage of the query by one track's sampled intervals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCoverage {
    pub track_id: String,
    pub track_name: String,
    pub tissue: String,
    pub cell_type: String,
    pub assay: String,
    pub source: String,
    pub unique_bp_covered: u64,
    pub overlap_pct: f64,
    pub hit_count: usize,
    pub hits: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexedResponse {
    pub query: QueryEcho,
    pub total_tracks_found: usize,
    pub results: Vec<TrackCoverage>,
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub catalog_tracks: usize,
    pub boundary_index_tracks: usize,
    pub indexed_query_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_chrom() {
        assert_eq!(normalize_chrom("chr1"), "1");
        assert_eq!(normalize_chrom("CHRX"), "x");
        assert_eq!(normalize_chrom("1"), "1");
        assert_eq!(normalize_chrom(" chrM "), "m");
        assert_eq!(normalize_chrom("chr"), "chr");
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let cases = [
            (0, 10, 5, 15),
            (0, 10, 10, 20),
            (5, 6, 0, 100),
            (100, 200, 0, 100),
            (3, 4, 3, 4),
        ];
        for (qs, qe, ts, te) in cases {
            assert_eq!(overlaps(qs, qe, ts, te), overlaps(ts, te, qs, qe));
        }
    }

    #[test]
    fn test_overlap_false_when_disjoint() {
        // te <= qs
        assert!(!overlaps(10, 20, 0, 10));
        assert!(!overlaps(10, 20, 0, 5));
        // ts >= qe
        assert!(!overlaps(10, 20, 20, 30));
        assert!(!overlaps(10, 20, 25, 30));
        assert!(overlaps(10, 20, 19, 30));
    }

    #[test]
    fn test_range_validation() {
        assert!(GenomicRange::new("chr1", 100, 100).is_err());
        assert!(GenomicRange::new("chr1", 200, 100).is_err());
        assert!(GenomicRange::new("", 0, 100).is_err());

        let range = GenomicRange::new("Chr1", 1000, 2000).unwrap();
        assert_eq!(range.chrom_key(), "1");
        assert_eq!(range.len(), 1000);
    }

    #[test]
    fn test_intersect() {
        let range = GenomicRange::new("chr1", 0, 500).unwrap();
        assert_eq!(range.intersect(100, 300), Some((100, 300)));
        assert_eq!(range.intersect(400, 900), Some((400, 500)));
        assert_eq!(range.intersect(500, 900), None);
    }
}
