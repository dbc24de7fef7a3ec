//! Best-effort streaming search for overlaps inside one remote track file.
//!
//! The scan is bounded twice: by the number of lines examined and by the
//! number of matches kept. Records are assumed to be sorted by start within
//! a chromosome, so the scan stops once a record on the query chromosome
//! starts past the query end. That assumption is checked as the scan goes:
//! after a decreasing start is seen the early stop is switched off.
//!
//! Results are therefore not guaranteed complete; [`TrackHits::complete`]
//! reports whether a work cap cut the scan short.

use crate::formats::{bed, is_header_line, parse_record};
use crate::storage::Storage;
use crate::types::{GenomicRange, MatchedInterval, Track, TrackHits, normalize_chrom};
use crate::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ScanLimits {
    /// Lines examined per track
    pub max_records: usize,
    /// Matches kept per track
    pub max_matches: usize,
    /// Wall-clock budget for one track
    pub timeout: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_records: 20_000,
            max_matches: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Per-track outcome. Only `Hits` reaches the caller; the rest is counted
/// and logged.
#[derive(Debug)]
pub enum TrackScan {
    Hits(TrackHits),
    Empty,
    Failed(Error),
}

/// What a scan over decompressed lines found.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub matches: Vec<MatchedInterval>,
    pub records_examined: usize,
    pub malformed: usize,
    /// Early stop was disabled because starts went backwards
    pub unsorted: bool,
    /// Ended by a record or match cap rather than by the data
    pub capped: bool,
}

/// Scan one track's remote file for intervals overlapping `range`.
///
/// Network, HTTP, decompression and timeout failures become
/// [`TrackScan::Failed`]; they are never returned as errors.
pub async fn scan_track(
    storage: &dyn Storage,
    track: &Track,
    range: &GenomicRange,
    limits: &ScanLimits,
) -> TrackScan {
    let scan = async {
        let stream = storage.open(&track.url).await?;
        let lines = bed::track_lines(stream)
            .await
            .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?;
        scan_lines(lines, track, range, limits).await
    };

    let report = match tokio::time::timeout(limits.timeout, scan).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => return TrackScan::Failed(e),
        Err(_) => {
            return TrackScan::Failed(Error::TrackFetch(format!(
                "{}: timed out after {:?}",
                track.url, limits.timeout
            )));
        }
    };

    if report.unsorted {
        debug!("Track {} is not sorted by start", track.id);
    }
    if report.matches.is_empty() {
        return TrackScan::Empty;
    }

    TrackScan::Hits(TrackHits {
        track_id: track.id.clone(),
        track_name: track.name.clone(),
        assay: track.assay.clone(),
        overlap_count: report.matches.len(),
        complete: !report.capped,
        results: report.matches,
    })
}

/// Scan decompressed lines. Malformed records are skipped.
pub async fn scan_lines<R>(
    mut lines: tokio::io::Lines<R>,
    track: &Track,
    range: &GenomicRange,
    limits: &ScanLimits,
) -> Result<ScanReport>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = ScanReport::default();
    let mut last_start: Option<u64> = None;

    loop {
        if report.records_examined >= limits.max_records {
            report.capped = true;
            break;
        }
        let line = lines
            .next_line()
            .await
            .map_err(|e| Error::TrackFetch(format!("{}: {}", track.url, e)))?;
        let Some(line) = line else {
            break;
        };
        report.records_examined += 1;

        if is_header_line(&line) {
            continue;
        }
        let record = match parse_record(&line, &track.schema) {
            Ok(record) => record,
            Err(_) => {
                report.malformed += 1;
                continue;
            }
        };
        if normalize_chrom(&record.chrom) != range.chrom_key() {
            continue;
        }

        if last_start.is_some_and(|prev| record.start < prev) {
            report.unsorted = true;
        }
        last_start = Some(record.start);

        if record.start > range.end && !report.unsorted {
            break;
        }

        if range.overlaps(record.start, record.end) {
            report.matches.push(MatchedInterval {
                chrom: record.chrom,
                start: record.start,
                end: record.end,
                extra: record.extra,
            });
            if report.matches.len() >= limits.max_matches {
                report.capped = true;
                break;
            }
        }
    }

    Ok(report)
}
