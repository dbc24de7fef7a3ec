//! Offline construction of the sampled spatial store.
//!
//! A random subset of the catalog is streamed track by track; every valid
//! record is offered to a per-track [`Reservoir`], and the finished samples
//! are written to the [`SpatialStore`] by a single writer task. Tracks that
//! fail contribute nothing.

pub mod store;

pub use store::{SampledInterval, SpatialStore, StorePool, StoredHit};

use crate::catalog::Catalog;
use crate::checkpoint::tmp_path;
use crate::formats::{bed, is_header_line, parse_record};
use crate::pool::WorkerPool;
use crate::sampling::Reservoir;
use crate::storage::Storage;
use crate::types::Track;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SubsetOptions {
    /// Tracks drawn from the catalog
    pub track_count: usize,
    /// Intervals kept per track
    pub reservoir_capacity: usize,
    pub workers: usize,
    /// Wall-clock budget for streaming one track
    pub timeout: Duration,
    pub seed: Option<u64>,
}

impl Default for SubsetOptions {
    fn default() -> Self {
        Self {
            track_count: 2500,
            reservoir_capacity: 1000,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            timeout: Duration::from_secs(600),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsetSummary {
    pub tracks_selected: usize,
    pub tracks_sampled: usize,
    pub tracks_failed: usize,
    pub intervals_stored: usize,
}

pub struct SubsetIndexer {
    storage: Arc<dyn Storage>,
    options: SubsetOptions,
}

impl SubsetIndexer {
    pub fn new(storage: Arc<dyn Storage>, options: SubsetOptions) -> Self {
        Self { storage, options }
    }

    /// Build a fresh store at `path` from a random subset of `catalog`.
    ///
    /// The store is written next to `path` and moved into place only once
    /// every selected track has been processed.
    pub async fn run(&self, catalog: &Catalog, path: &Path) -> Result<SubsetSummary> {
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let tracks = catalog.sample(self.options.track_count, &mut rng);
        info!(
            "Sampling {} of {} tracks with {} workers",
            tracks.len(),
            catalog.len(),
            self.options.workers
        );

        let building = tmp_path(path);
        let store = SpatialStore::create(&building)?;
        let (tx, rx) =
            mpsc::channel::<(Track, Vec<SampledInterval>)>(self.options.workers.max(1) * 2);
        let writer = tokio::task::spawn_blocking(move || write_samples(store, rx));

        let mut summary = SubsetSummary {
            tracks_selected: tracks.len(),
            ..Default::default()
        };

        let mut pool = WorkerPool::new(self.options.workers);
        for track in tracks {
            let storage = Arc::clone(&self.storage);
            let capacity = self.options.reservoir_capacity;
            let timeout = self.options.timeout;
            let track_rng = StdRng::seed_from_u64(rng.random());
            pool.spawn(async move {
                let sample = tokio::time::timeout(
                    timeout,
                    sample_track(storage.as_ref(), &track, capacity, track_rng),
                )
                .await
                .unwrap_or_else(|_| Err(Error::TrackFetch(format!("{}: timed out", track.url))));
                (track, sample)
            });
        }

        let mut done = 0;
        while let Some((track, sample)) = pool.join_next().await {
            done += 1;
            match sample {
                Ok(intervals) if !intervals.is_empty() => {
                    summary.tracks_sampled += 1;
                    tx.send((track, intervals))
                        .await
                        .map_err(|_| Error::Internal("store writer stopped".to_string()))?;
                }
                Ok(_) => summary.tracks_failed += 1,
                Err(e) => {
                    summary.tracks_failed += 1;
                    debug!("Skipping track {}: {}", track.id, e);
                }
            }
            if done % 100 == 0 {
                info!("Sampled {}/{} tracks", done, summary.tracks_selected);
            }
        }
        drop(tx);

        summary.intervals_stored = writer
            .await
            .map_err(|e| Error::Internal(format!("store writer panicked: {}", e)))??;
        std::fs::rename(&building, path)?;

        info!(
            "Built {} with {} intervals from {} tracks ({} failed)",
            path.display(),
            summary.intervals_stored,
            summary.tracks_sampled,
            summary.tracks_failed
        );
        Ok(summary)
    }
}

/// Single writer: drains finished samples into the store.
fn write_samples(
    mut store: SpatialStore,
    mut rx: mpsc::Receiver<(Track, Vec<SampledInterval>)>,
) -> Result<usize> {
    let mut total = 0;
    while let Some((track, intervals)) = rx.blocking_recv() {
        total += store.insert_track(&track, &intervals)?;
    }
    Ok(total)
}

/// Stream one track in full and keep a uniform sample of its valid records.
pub async fn sample_track<R: Rng>(
    storage: &dyn Storage,
    track: &Track,
    capacity: usize,
    rng: R,
) -> Result<Vec<SampledInterval>> {
    let stream = storage.open(&track.url).await?;
    let mut lines = bed::track_lines(stream)
        .await
        .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?;
    let mut reservoir = Reservoir::new(capacity, rng);

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?
    {
        if is_header_line(&line) {
            continue;
        }
        if let Ok(record) = parse_record(&line, &track.schema) {
            reservoir.offer(SampledInterval {
                chrom: record.chrom,
                start: record.start,
                end: record.end,
            });
        }
    }

    debug!(
        "Track {}: kept {} of {} records",
        track.id,
        reservoir.len(),
        reservoir.seen()
    );
    Ok(reservoir.into_sample())
}
