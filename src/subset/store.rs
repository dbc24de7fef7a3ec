//! SQLite-backed spatial store of sampled intervals.
//!
//! Table `metadata` holds one row per sampled interval with a denormalized
//! copy of its track's metadata. The R-tree virtual table `idx_intervals`
//! shares the row id and indexes `(start, end)` so overlap queries avoid a
//! full scan. `rtree_i32` keeps coordinates as exact 32-bit integers.

use crate::types::{GenomicRange, Track, normalize_chrom};
use crate::{Error, Result};
use rusqlite::{Connection, OpenFlags, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// One sampled interval of a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledInterval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// A stored interval matched by a range query, with its track metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHit {
    pub track_id: String,
    pub track_name: String,
    pub chrom: String,
    pub tissue: String,
    pub cell_type: String,
    pub assay: String,
    pub source: String,
    pub start: u64,
    pub end: u64,
}

pub struct SpatialStore {
    connection: Connection,
}

impl SpatialStore {
    /// Create an empty store at `path`, replacing any existing file.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let connection = Connection::open(path)?;
        connection.execute_batch(
            "CREATE VIRTUAL TABLE idx_intervals USING rtree_i32(id, start, end);
             CREATE TABLE metadata (
                id INTEGER PRIMARY KEY,
                track_id TEXT NOT NULL,
                track_name TEXT NOT NULL,
                chrom TEXT NOT NULL,
                chrom_key TEXT NOT NULL,
                tissue TEXT NOT NULL,
                cell_type TEXT NOT NULL,
                assay TEXT NOT NULL,
                source TEXT NOT NULL
             );
             CREATE INDEX metadata_chrom_key ON metadata(chrom_key);",
        )?;
        Ok(Self { connection })
    }

    /// Open an existing store for querying.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::IndexMissing(format!(
                "spatial store {} does not exist",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(path, flags)?;
        Ok(Self { connection })
    }

    /// Insert one track's sample in a single transaction.
    ///
    /// Intervals that do not fit 32-bit coordinates or are empty are skipped.
    /// Returns the number of rows written.
    pub fn insert_track(&mut self, track: &Track, intervals: &[SampledInterval]) -> Result<usize> {
        let mut inserted = 0;
        let transaction = self.connection.transaction()?;
        {
            let mut insert_meta = transaction.prepare(
                "INSERT INTO metadata
                    (track_id, track_name, chrom, chrom_key, tissue, cell_type, assay, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut insert_interval =
                transaction.prepare("INSERT INTO idx_intervals VALUES (?1, ?2, ?3)")?;

            for interval in intervals {
                let (Ok(start), Ok(end)) =
                    (i32::try_from(interval.start), i32::try_from(interval.end))
                else {
                    continue;
                };
                if end <= start {
                    continue;
                }
                let id = insert_meta.insert(params![
                    track.id,
                    track.name,
                    interval.chrom,
                    normalize_chrom(&interval.chrom),
                    track.tissue,
                    track.cell_type,
                    track.assay,
                    track.source,
                ])?;
                insert_interval.execute(params![id, start, end])?;
                inserted += 1;
            }
        }
        transaction.commit()?;
        debug!("Stored {} intervals for track {}", inserted, track.id);
        Ok(inserted)
    }

    /// Intervals on the query chromosome with `start < range.end` and
    /// `end > range.start`, optionally limited to one tissue category.
    pub fn query(&self, range: &GenomicRange, tissue: Option<&str>) -> Result<Vec<StoredHit>> {
        let start = clamp_i32(range.start);
        let end = clamp_i32(range.end);

        let mut statement = self.connection.prepare_cached(
            r#"SELECT m.track_id, m.track_name, m.chrom, m.tissue, m.cell_type, m.assay, m.source,
                    i.start, i."end"
             FROM idx_intervals i
             JOIN metadata m ON m.id = i.id
             WHERE i.start < ?1 AND i."end" > ?2
               AND m.chrom_key = ?3
               AND (?4 IS NULL OR m.tissue = ?4)"#,
        )?;
        let rows = statement.query_map(
            params![end, start, range.chrom_key(), tissue],
            Self::row_to_hit,
        )?;
        let hits = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(hits)
    }

    /// Total number of stored intervals
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM metadata", (), |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn row_to_hit(row: &Row) -> rusqlite::Result<StoredHit> {
        let start: i64 = row.get(7)?;
        let end: i64 = row.get(8)?;
        Ok(StoredHit {
            track_id: row.get(0)?,
            track_name: row.get(1)?,
            chrom: row.get(2)?,
            tissue: row.get(3)?,
            cell_type: row.get(4)?,
            assay: row.get(5)?,
            source: row.get(6)?,
            start: start.max(0) as u64,
            end: end.max(0) as u64,
        })
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Read-only connections to one store, opened on demand and reused.
///
/// Each query checks a connection out for its duration, so concurrent
/// queries run on separate connections. The lock only guards the idle list.
pub struct StorePool {
    path: PathBuf,
    idle: Mutex<Vec<SpatialStore>>,
}

impl StorePool {
    /// Open the store at `path`, failing with `IndexMissing` when absent.
    pub fn open(path: &Path) -> Result<Self> {
        let first = SpatialStore::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(vec![first]),
        })
    }

    pub fn query(&self, range: &GenomicRange, tissue: Option<&str>) -> Result<Vec<StoredHit>> {
        let store = self.checkout()?;
        let hits = store.query(range, tissue);
        self.checkin(store)?;
        hits
    }

    /// Connections currently parked in the pool
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().map_or(0, |idle| idle.len())
    }

    fn checkout(&self) -> Result<SpatialStore> {
        let parked = self
            .idle
            .lock()
            .map_err(|_| Error::Internal("store pool lock poisoned".to_string()))?
            .pop();
        match parked {
            Some(store) => Ok(store),
            None => SpatialStore::open(&self.path),
        }
    }

    fn checkin(&self, store: SpatialStore) -> Result<()> {
        self.idle
            .lock()
            .map_err(|_| Error::Internal("store pool lock poisoned".to_string()))?
            .push(store);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnSchema;

    fn track(id: &str, tissue: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("{} name", id),
            assay: "ChIP-seq".to_string(),
            tissue: tissue.to_string(),
            cell_type: "K562".to_string(),
            source: "ENCODE".to_string(),
            url: format!("https://example.org/{}.bed.gz", id),
            schema: ColumnSchema::DEFAULT,
        }
    }

    fn interval(chrom: &str, start: u64, end: u64) -> SampledInterval {
        SampledInterval {
            chrom: chrom.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_insert_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genomics_subset.db");

        let mut store = SpatialStore::create(&path).unwrap();
        let written = store
            .insert_track(
                &track("X", "Blood"),
                &[
                    interval("chr1", 100, 300),
                    interval("chr1", 250, 400),
                    interval("chr2", 100, 300),
                    interval("chr1", 600, 700),
                    interval("chr1", 10, 10),
                    interval("chr1", 5_000_000_000, 5_000_000_100),
                ],
            )
            .unwrap();
        assert_eq!(written, 4);
        store
            .insert_track(&track("Y", "Brain"), &[interval("1", 450, 550)])
            .unwrap();
        drop(store);

        let store = SpatialStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 5);

        let range = GenomicRange::new("chr1", 0, 500).unwrap();
        let mut hits = store.query(&range, None).unwrap();
        hits.sort_by_key(|h| (h.track_id.clone(), h.start));
        let spans: Vec<(&str, u64, u64)> = hits
            .iter()
            .map(|h| (h.track_id.as_str(), h.start, h.end))
            .collect();
        assert_eq!(spans, vec![("X", 100, 300), ("X", 250, 400), ("Y", 450, 550)]);

        let blood = store.query(&range, Some("Blood")).unwrap();
        assert_eq!(blood.len(), 2);
        assert!(blood.iter().all(|h| h.tissue == "Blood"));
    }

    #[test]
    fn test_query_boundaries_are_half_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut store = SpatialStore::create(&path).unwrap();
        store
            .insert_track(&track("X", "Blood"), &[interval("chr1", 100, 200)])
            .unwrap();

        let touching_end = GenomicRange::new("chr1", 200, 300).unwrap();
        assert!(store.query(&touching_end, None).unwrap().is_empty());
        let touching_start = GenomicRange::new("chr1", 0, 100).unwrap();
        assert!(store.query(&touching_start, None).unwrap().is_empty());
        let inside = GenomicRange::new("chr1", 199, 300).unwrap();
        assert_eq!(store.query(&inside, None).unwrap().len(), 1);
    }

    #[test]
    fn test_pool_hands_out_separate_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let mut store = SpatialStore::create(&path).unwrap();
        store
            .insert_track(&track("X", "Blood"), &[interval("chr1", 100, 200)])
            .unwrap();
        drop(store);

        let pool = StorePool::open(&path).unwrap();
        assert_eq!(pool.idle_connections(), 1);

        // two queries in flight at once hold two connections
        let a = pool.checkout().unwrap();
        let b = pool.checkout().unwrap();
        assert_eq!(pool.idle_connections(), 0);
        pool.checkin(a).unwrap();
        pool.checkin(b).unwrap();
        assert_eq!(pool.idle_connections(), 2);

        let range = GenomicRange::new("chr1", 150, 160).unwrap();
        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| pool.query(&range, None).unwrap().len()))
                .collect();
            for worker in workers {
                assert_eq!(worker.join().unwrap(), 1);
            }
        });
        assert!((2..=4).contains(&pool.idle_connections()));
    }

    #[test]
    fn test_open_missing_store() {
        let err = SpatialStore::open(Path::new("/nonexistent/genomics_subset.db")).err().unwrap();
        assert!(matches!(err, Error::IndexMissing(_)));
        let err = StorePool::open(Path::new("/nonexistent/genomics_subset.db")).err().unwrap();
        assert!(matches!(err, Error::IndexMissing(_)));
    }
}
