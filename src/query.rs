//! Query orchestration over the two deployment modes of the engine.
//!
//! - Prune-then-stream: shortlist tracks through the [`BoundaryIndex`], then
//!   scan each candidate's remote file concurrently.
//! - Indexed: one range query against the sampled store ([`StorePool`]), reduced
//!   to per-track coverage of the query.
//!
//! The engine is built once at startup and only read afterwards.

use crate::boundary::{BoundaryIndex, Prune};
use crate::catalog::Catalog;
use crate::coverage::{coverage_pct, unique_coverage};
use crate::pool::WorkerPool;
use crate::scanner::{ScanLimits, TrackScan, scan_track};
use crate::storage::Storage;
use crate::subset::{StorePool, StoredHit};
use crate::types::{
    GenomicRange, IndexedResponse, QueryEcho, StreamResponse, Track, TrackCoverage,
};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub limits: ScanLimits,
    /// Concurrent track scans per query
    pub scan_workers: usize,
    /// Candidates scanned when the caller gives no limit
    pub default_max_tracks: usize,
    /// Upper bound on any caller-supplied candidate limit
    pub max_tracks_cap: usize,
    /// Keep tracks the boundary index knows nothing about
    pub include_unindexed: bool,
    /// Tracks returned by the indexed path when the caller gives no limit
    pub default_indexed_limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limits: ScanLimits::default(),
            scan_workers: 10,
            default_max_tracks: 20,
            max_tracks_cap: 500,
            include_unindexed: true,
            default_indexed_limit: 50,
        }
    }
}

pub struct QueryEngine {
    catalog: Catalog,
    boundaries: Option<BoundaryIndex>,
    store: Option<Arc<StorePool>>,
    storage: Arc<dyn Storage>,
    options: QueryOptions,
}

impl QueryEngine {
    pub fn new(catalog: Catalog, storage: Arc<dyn Storage>, options: QueryOptions) -> Self {
        Self {
            catalog,
            boundaries: None,
            store: None,
            storage,
            options,
        }
    }

    pub fn with_boundaries(mut self, boundaries: BoundaryIndex) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    pub fn with_store(mut self, store: StorePool) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn boundaries(&self) -> Option<&BoundaryIndex> {
        self.boundaries.as_ref()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Catalog tracks that may overlap `range`, in catalog order, at most
    /// `max_tracks` of them.
    pub fn candidates(&self, range: &GenomicRange, max_tracks: usize) -> Result<Vec<&Track>> {
        let boundaries = self
            .boundaries
            .as_ref()
            .ok_or_else(|| Error::IndexMissing("boundary index not loaded".to_string()))?;

        Ok(self
            .catalog
            .tracks()
            .iter()
            .filter(|track| match boundaries.prune(&track.id, range) {
                Prune::Keep => true,
                Prune::Unindexed => self.options.include_unindexed,
                Prune::OtherChromosome | Prune::OutsideSpan => false,
            })
            .take(max_tracks)
            .collect())
    }

    /// Prune-then-stream query. Per-track failures only show up in
    /// `failed_tracks`.
    pub async fn stream_overlaps(
        &self,
        range: &GenomicRange,
        max_tracks: Option<usize>,
    ) -> Result<StreamResponse> {
        let max_tracks = max_tracks
            .unwrap_or(self.options.default_max_tracks)
            .min(self.options.max_tracks_cap);
        let candidates = self.candidates(range, max_tracks)?;
        let candidate_count = candidates.len();
        debug!(
            "{}:{}-{} -> {} candidate tracks",
            range.chrom, range.start, range.end, candidate_count
        );

        let mut pool = WorkerPool::new(self.options.scan_workers);
        for (order, track) in candidates.into_iter().enumerate() {
            let storage = Arc::clone(&self.storage);
            let track = track.clone();
            let range = range.clone();
            let limits = self.options.limits.clone();
            pool.spawn(async move {
                let scan = scan_track(storage.as_ref(), &track, &range, &limits).await;
                (order, track.id, scan)
            });
        }

        let mut found = Vec::new();
        let mut failed = 0;
        for (order, track_id, scan) in pool.collect().await {
            match scan {
                TrackScan::Hits(hits) => found.push((order, hits)),
                TrackScan::Empty => {}
                TrackScan::Failed(e) => {
                    failed += 1;
                    debug!("Track {} contributed no result: {}", track_id, e);
                }
            }
        }
        found.sort_by_key(|(order, _)| *order);

        info!(
            "{}:{}-{}: {} candidates, {} with overlaps, {} failed",
            range.chrom,
            range.start,
            range.end,
            candidate_count,
            found.len(),
            failed
        );

        Ok(StreamResponse {
            query: QueryEcho::from(range),
            tracks_indexed_as_candidates: candidate_count,
            total_tracks_found: found.len(),
            failed_tracks: failed,
            results: found.into_iter().map(|(_, hits)| hits).collect(),
        })
    }

    /// Indexed query against the sampled store.
    pub async fn indexed_overlaps(
        &self,
        range: &GenomicRange,
        tissue: Option<String>,
        limit: Option<usize>,
    ) -> Result<IndexedResponse> {
        let store = self
            .store
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::IndexMissing("spatial store not loaded".to_string()))?;

        let query_range = range.clone();
        let hits = tokio::task::spawn_blocking(move || {
            store.query(&query_range, tissue.as_deref())
        })
        .await
        .map_err(|e| Error::Internal(format!("store query panicked: {}", e)))??;

        let mut results = coverage_by_track(range, hits);
        results.truncate(limit.unwrap_or(self.options.default_indexed_limit));

        Ok(IndexedResponse {
            query: QueryEcho::from(range),
            total_tracks_found: results.len(),
            results,
        })
    }
}

/// Reduce stored hits to per-track coverage of `range`, ranked by unique
/// covered bases.
///
/// Each hit is clipped to the query before merging, so coverage never
/// counts bases outside the query.
pub fn coverage_by_track(range: &GenomicRange, hits: Vec<StoredHit>) -> Vec<TrackCoverage> {
    let mut by_track: HashMap<String, Vec<StoredHit>> = HashMap::new();
    for hit in hits {
        by_track.entry(hit.track_id.clone()).or_default().push(hit);
    }

    let mut results: Vec<TrackCoverage> = by_track
        .into_values()
        .filter_map(|hits| {
            let mut clipped: Vec<(u64, u64)> = hits
                .iter()
                .filter_map(|h| range.intersect(h.start, h.end))
                .collect();
            if clipped.is_empty() {
                return None;
            }
            clipped.sort_unstable();

            let covered = unique_coverage(&clipped);
            let first = &hits[0];
            Some(TrackCoverage {
                track_id: first.track_id.clone(),
                track_name: first.track_name.clone(),
                tissue: first.tissue.clone(),
                cell_type: first.cell_type.clone(),
                assay: first.assay.clone(),
                source: first.source.clone(),
                unique_bp_covered: covered,
                overlap_pct: coverage_pct(covered, range.len()),
                hit_count: clipped.len(),
                hits: clipped
                    .iter()
                    .map(|(s, e)| format!("{}:{}-{}", range.chrom, s, e))
                    .collect(),
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.unique_bp_covered
            .cmp(&a.unique_bp_covered)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::bed::testing::compress;
    use crate::storage::LocalStorage;
    use crate::types::ColumnSchema;

    fn track(id: &str, url: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("track {}", id),
            assay: "ChIP-seq".to_string(),
            tissue: "Blood".to_string(),
            cell_type: "K562".to_string(),
            source: "ENCODE".to_string(),
            url: url.to_string(),
            schema: ColumnSchema::DEFAULT,
        }
    }

    fn hit(track_id: &str, start: u64, end: u64) -> StoredHit {
        StoredHit {
            track_id: track_id.to_string(),
            track_name: format!("track {}", track_id),
            chrom: "chr1".to_string(),
            tissue: "Blood".to_string(),
            cell_type: "K562".to_string(),
            assay: "ChIP-seq".to_string(),
            source: "ENCODE".to_string(),
            start,
            end,
        }
    }

    /// Three tracks: A spans chr1 [500,1500], B only chr2, C only chr3.
    fn engine(dir: &std::path::Path) -> QueryEngine {
        for name in ["a", "b", "c"] {
            std::fs::write(
                dir.join(format!("{}.bed.gz", name)),
                compress("chr1\t1200\t1300\tpeak\n"),
            )
            .unwrap();
        }
        let catalog = Catalog::new(vec![
            track("A", "a.bed.gz"),
            track("B", "b.bed.gz"),
            track("C", "c.bed.gz"),
        ]);
        let mut boundaries = BoundaryIndex::default();
        boundaries.insert("A", "chr1", [500, 1500]);
        boundaries.insert("B", "chr2", [0, 5000]);
        boundaries.insert("C", "chr3", [0, 5000]);

        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.to_path_buf()));
        QueryEngine::new(catalog, storage, QueryOptions::default()).with_boundaries(boundaries)
    }

    #[tokio::test]
    async fn test_only_overlapping_candidate_is_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let range = GenomicRange::new("chr1", 1000, 2000).unwrap();

        let candidates = engine.candidates(&range, 20).unwrap();
        let ids: Vec<&str> = candidates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);

        let response = engine.stream_overlaps(&range, None).await.unwrap();
        assert_eq!(response.tracks_indexed_as_candidates, 1);
        assert_eq!(response.total_tracks_found, 1);
        assert_eq!(response.results[0].track_id, "A");
        assert_eq!(response.results[0].results[0].start, 1200);
    }

    #[tokio::test]
    async fn test_unindexed_tracks_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        engine.catalog = Catalog::new(vec![
            track("A", "a.bed.gz"),
            track("U", "a.bed.gz"),
            track("M", "missing.bed.gz"),
        ]);
        let range = GenomicRange::new("1", 1000, 2000).unwrap();

        let response = engine.stream_overlaps(&range, None).await.unwrap();
        assert_eq!(response.tracks_indexed_as_candidates, 3);
        assert_eq!(response.total_tracks_found, 2);
        assert_eq!(response.failed_tracks, 1);
        let ids: Vec<&str> = response.results.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "U"]);

        engine.options.include_unindexed = false;
        assert_eq!(engine.candidates(&range, 20).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_candidate_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path());
        engine.catalog = Catalog::new((0..30).map(|i| track(&format!("U{}", i), "a.bed.gz")).collect());
        let range = GenomicRange::new("chr1", 1000, 2000).unwrap();

        let response = engine.stream_overlaps(&range, Some(5)).await.unwrap();
        assert_eq!(response.tracks_indexed_as_candidates, 5);
        let response = engine.stream_overlaps(&range, None).await.unwrap();
        assert_eq!(response.tracks_indexed_as_candidates, 20);
    }

    #[tokio::test]
    async fn test_paths_require_their_index() {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(".".into()));
        let engine = QueryEngine::new(Catalog::default(), storage, QueryOptions::default());
        let range = GenomicRange::new("chr1", 0, 10).unwrap();

        assert!(matches!(
            engine.stream_overlaps(&range, None).await,
            Err(Error::IndexMissing(_))
        ));
        assert!(matches!(
            engine.indexed_overlaps(&range, None, None).await,
            Err(Error::IndexMissing(_))
        ));
    }

    #[test]
    fn test_coverage_merges_clipped_hits() {
        let range = GenomicRange::new("chr1", 0, 500).unwrap();
        let results = coverage_by_track(&range, vec![hit("X", 100, 300), hit("X", 250, 400)]);

        assert_eq!(results.len(), 1);
        let x = &results[0];
        assert_eq!(x.unique_bp_covered, 300);
        assert_eq!(x.overlap_pct, 60.0);
        assert_eq!(x.hit_count, 2);
        assert_eq!(x.hits, vec!["chr1:100-300", "chr1:250-400"]);
    }

    #[test]
    fn test_coverage_clips_to_query_and_ranks() {
        let range = GenomicRange::new("chr1", 1000, 2000).unwrap();
        let results = coverage_by_track(
            &range,
            vec![
                hit("small", 1100, 1150),
                hit("big", 0, 5000),
                hit("mid", 1900, 2500),
                hit("mid", 1000, 1050),
            ],
        );

        let ranked: Vec<(&str, u64)> = results
            .iter()
            .map(|r| (r.track_id.as_str(), r.unique_bp_covered))
            .collect();
        assert_eq!(ranked, vec![("big", 1000), ("mid", 150), ("small", 50)]);
        assert_eq!(results[0].overlap_pct, 100.0);
        assert_eq!(results[1].hits, vec!["chr1:1000-1050", "chr1:1900-2000"]);
    }

    #[tokio::test]
    async fn test_indexed_query_against_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genomics_subset.db");
        let mut store = crate::subset::SpatialStore::create(&path).unwrap();
        store
            .insert_track(
                &track("X", "x.bed.gz"),
                &[
                    crate::subset::SampledInterval {
                        chrom: "chr1".to_string(),
                        start: 100,
                        end: 300,
                    },
                    crate::subset::SampledInterval {
                        chrom: "chr1".to_string(),
                        start: 250,
                        end: 400,
                    },
                ],
            )
            .unwrap();
        drop(store);

        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(dir.path().to_path_buf()));
        let engine = QueryEngine::new(Catalog::default(), storage, QueryOptions::default())
            .with_store(StorePool::open(&path).unwrap());
        let range = GenomicRange::new("chr1", 0, 500).unwrap();

        let response = engine.indexed_overlaps(&range, None, None).await.unwrap();
        assert_eq!(response.total_tracks_found, 1);
        assert_eq!(response.results[0].unique_bp_covered, 300);
        assert_eq!(response.results[0].overlap_pct, 60.0);

        let none = engine
            .indexed_overlaps(&range, Some("Brain".to_string()), None)
            .await
            .unwrap();
        assert!(none.results.is_empty());

        // concurrent indexed queries each get their own connection
        let queries = (0..8).map(|_| engine.indexed_overlaps(&range, None, None));
        for response in futures::future::join_all(queries).await {
            assert_eq!(response.unwrap().results[0].unique_bp_covered, 300);
        }
    }
}
