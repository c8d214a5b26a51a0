//! Checkpoint persistence
//!
//! The checkpoint marks the instant through which synchronization is
//! complete. It is stored as a small JSON file and replaced atomically.

use crate::{EventSyncError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Last successful sync instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_updated: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(last_updated: DateTime<Utc>) -> Self {
        Self { last_updated }
    }

    /// The Unix epoch: everything is newer, so a first run is a full sync
    pub fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Build a checkpoint from a wall-clock date and time in the local zone
    pub fn from_local(date: NaiveDate, time: NaiveTime) -> Result<Self> {
        let naive = date.and_time(time);
        let local = Local.from_local_datetime(&naive).earliest().ok_or_else(|| {
            EventSyncError::Parse(format!("{} does not exist in the local time zone", naive))
        })?;
        Ok(Self::new(local.with_timezone(&Utc)))
    }
}

/// Where the checkpoint lives
pub trait CheckpointStore {
    /// None when no sync has completed yet
    fn load_checkpoint(&self) -> Result<Option<Checkpoint>>;

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
}

/// JSON checkpoint file, e.g. `{ "last_updated": "2024-01-10T12:00:00Z" }`
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No checkpoint file");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        Ok(Some(checkpoint))
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        // Write to a sibling temp file, then rename over the old checkpoint
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, checkpoint)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EventSyncError::Io(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            last_updated = %checkpoint.last_updated,
            "Saved checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
        assert_eq!(store.load_checkpoint().unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("state").join("checkpoint.json"));
        let checkpoint = Checkpoint::new(Utc.with_ymd_and_hms(2024, 1, 10, 12, 30, 0).unwrap());

        store.save_checkpoint(&checkpoint).unwrap();
        assert_eq!(store.load_checkpoint().unwrap(), Some(checkpoint));

        let later = Checkpoint::new(Utc.with_ymd_and_hms(2024, 1, 11, 8, 0, 0).unwrap());
        store.save_checkpoint(&later).unwrap();
        assert_eq!(store.load_checkpoint().unwrap(), Some(later));
    }

    #[test]
    fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, r#"{ "last_updated": "2024-01-10T12:00:00Z" }"#).unwrap();

        let store = FileCheckpointStore::new(&path);
        let checkpoint = store.load_checkpoint().unwrap().unwrap();
        assert_eq!(
            checkpoint.last_updated,
            Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, "not json").unwrap();
        assert!(FileCheckpointStore::new(&path).load_checkpoint().is_err());
    }

    #[test]
    fn test_epoch() {
        assert_eq!(Checkpoint::epoch().last_updated.timestamp(), 0);
    }
}
