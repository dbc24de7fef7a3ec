//! Resumable batch jobs.
//!
//! A [`Checkpoint`] owns the accumulated state of a long-running job, loads
//! whatever a previous run persisted, and writes the state back every
//! `every` recorded units and once more on [`Checkpoint::finish`]. A crash
//! loses at most the last partial batch.

use crate::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct Checkpoint<S> {
    path: PathBuf,
    every: usize,
    pending: usize,
    saves: usize,
    state: S,
}

impl<S> Checkpoint<S>
where
    S: Serialize + DeserializeOwned + Default,
{
    /// Load the state persisted at `path`, or start from `S::default()`.
    pub fn load(path: impl Into<PathBuf>, every: usize) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let state = serde_json::from_str(&text)?;
            info!("Resuming from checkpoint {}", path.display());
            state
        } else {
            S::default()
        };

        Ok(Self {
            path,
            every: every.max(1),
            pending: 0,
            saves: 0,
            state,
        })
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Apply one processed unit to the state, persisting on cadence.
    ///
    /// Returns `true` when this call wrote a snapshot.
    pub fn record(&mut self, apply: impl FnOnce(&mut S)) -> Result<bool> {
        apply(&mut self.state);
        self.pending += 1;
        if self.pending >= self.every {
            self.save()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Number of snapshots written so far
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Persist the final state and hand it back.
    pub fn finish(mut self) -> Result<S> {
        self.save()?;
        Ok(self.state)
    }

    fn save(&mut self) -> Result<()> {
        let json = serde_json::to_vec(&self.state)?;
        write_atomic(&self.path, &json)?;
        self.pending = 0;
        self.saves += 1;
        debug!("Checkpoint written to {}", self.path.display());
        Ok(())
    }
}

/// Write `data` to a sibling temp file and rename it over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// `<path>.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    type Counts = BTreeMap<String, u32>;

    #[test]
    fn test_saves_on_cadence_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut checkpoint: Checkpoint<Counts> = Checkpoint::load(&path, 2).unwrap();
        assert!(!checkpoint.record(|s| { s.insert("a".into(), 1); }).unwrap());
        assert!(checkpoint.record(|s| { s.insert("b".into(), 2); }).unwrap());
        assert!(path.exists());
        assert!(!checkpoint.record(|s| { s.insert("c".into(), 3); }).unwrap());
        assert_eq!(checkpoint.saves(), 1);

        // the snapshot on disk has only the first batch
        let on_disk: Counts = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);

        let state = checkpoint.finish().unwrap();
        assert_eq!(state.len(), 3);
        let on_disk: Counts = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, state);
    }

    #[test]
    fn test_resumes_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut first: Checkpoint<Counts> = Checkpoint::load(&path, 10).unwrap();
        first.record(|s| { s.insert("a".into(), 1); }).unwrap();
        first.finish().unwrap();

        let second: Checkpoint<Counts> = Checkpoint::load(&path, 10).unwrap();
        assert_eq!(second.state().get("a"), Some(&1));
        assert!(!tmp_path(&path).exists());
    }
}
