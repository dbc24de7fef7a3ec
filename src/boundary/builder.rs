use super::BoundaryIndex;
use crate::checkpoint::Checkpoint;
use crate::formats::{bed, is_header_line, parse_record};
use crate::pool::WorkerPool;
use crate::storage::{ByteRange, Storage};
use crate::types::{Track, normalize_chrom};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct BoundaryOptions {
    /// Bytes fetched from the start of each file
    pub prefix_bytes: u64,
    /// Span assumed past the first observed start
    pub span: u64,
    /// Persist after this many newly indexed tracks
    pub checkpoint_every: usize,
    pub workers: usize,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            prefix_bytes: 153_601,
            span: 10_000_000,
            checkpoint_every: 500,
            workers: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Tracks skipped because a previous run indexed them
    pub already_indexed: usize,
    /// Tracks fetched during this run
    pub attempted: usize,
    pub indexed: usize,
    pub failed: usize,
    /// Tracks in the index after this run
    pub total: usize,
}

/// Resumable builder for the boundary index.
pub struct BoundaryIndexBuilder {
    storage: Arc<dyn Storage>,
    options: BoundaryOptions,
}

impl BoundaryIndexBuilder {
    pub fn new(storage: Arc<dyn Storage>, options: BoundaryOptions) -> Self {
        Self { storage, options }
    }

    /// Index every catalog track not yet present in the index at `path`.
    ///
    /// Per-track failures are logged and skipped so a later run retries them.
    pub async fn run(&self, tracks: &[Track], path: &Path) -> Result<BuildSummary> {
        let mut checkpoint: Checkpoint<BoundaryIndex> =
            Checkpoint::load(path, self.options.checkpoint_every)?;

        let pending: Vec<Track> = tracks
            .iter()
            .filter(|t| !checkpoint.state().contains(&t.id))
            .cloned()
            .collect();

        let mut summary = BuildSummary {
            already_indexed: tracks.len() - pending.len(),
            attempted: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            info!("All {} tracks already indexed", tracks.len());
            summary.total = checkpoint.state().len();
            return Ok(summary);
        }

        info!(
            "Indexing {} remaining tracks (total: {})",
            pending.len(),
            tracks.len()
        );

        let mut pool = WorkerPool::new(self.options.workers);
        for track in pending {
            let storage = Arc::clone(&self.storage);
            let options = self.options.clone();
            pool.spawn(async move {
                let bounds = track_bounds(storage.as_ref(), &track, &options).await;
                (track.id, bounds)
            });
        }

        while let Some((track_id, bounds)) = pool.join_next().await {
            match bounds {
                Ok((chrom, span)) => {
                    summary.indexed += 1;
                    let saved = checkpoint.record(|index| index.insert(track_id, &chrom, span))?;
                    if saved {
                        info!(
                            "Checkpoint: {} indexed, {} failed, {} remaining",
                            summary.indexed,
                            summary.failed,
                            pool.len()
                        );
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    debug!("Skipping track {}: {}", track_id, e);
                }
            }
        }

        let index = checkpoint.finish()?;
        summary.total = index.len();
        info!(
            "Finished boundary index: {} new, {} failed, {} total",
            summary.indexed, summary.failed, summary.total
        );
        Ok(summary)
    }
}

/// Approximate span of one track from the first data row of its file prefix.
///
/// Returns the normalized chromosome and `[start, start + span]`.
pub async fn track_bounds(
    storage: &dyn Storage,
    track: &Track,
    options: &BoundaryOptions,
) -> Result<(String, [u64; 2])> {
    let prefix = storage
        .read_bytes(&track.url, Some(ByteRange::prefix(options.prefix_bytes)))
        .await?;

    let mut lines = bed::prefix_lines(prefix)
        .await
        .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?;
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?;
        let Some(line) = line else {
            return Err(Error::TrackFetch(format!("{}: no data rows", track.url)));
        };
        if is_header_line(&line) {
            continue;
        }
        // a malformed leading row does not condemn the track
        if let Ok(record) = parse_record(&line, &track.schema) {
            let chrom = normalize_chrom(&record.chrom);
            return Ok((chrom, [record.start, record.start.saturating_add(options.span)]));
        }
    }
}
