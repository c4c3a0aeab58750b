//! Atomic JSON snapshot file.
//!
//! Writes go to `<path>.tmp`, which is fsynced and renamed over `<path>`
//! before the parent directory is fsynced, so readers see either the old
//! snapshot or the new one and never a partial write.

use std::fs::{File, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::PersistenceError;
use crate::github::models::PullRequestRecord;

const SNAPSHOT_FILE_NAME: &str = "pr-radar-snapshot.json";

/// On-disk snapshot: `{ "asOf": <ms>, "records": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Unix epoch milliseconds of the cycle that produced the snapshot.
    pub as_of: u64,
    /// Records in the canonical set.
    pub records: Vec<PullRequestRecord>,
}

/// Default snapshot location in the system temporary directory.
#[must_use]
pub fn default_snapshot_path() -> Utf8PathBuf {
    let temp = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
    temp.join(SNAPSHOT_FILE_NAME)
}

/// Handle to the persisted snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    path: Utf8PathBuf,
}

impl SnapshotFile {
    /// Creates a handle for `path`. Nothing is touched until load or save.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the snapshot, treating absence and corruption as "no snapshot".
    ///
    /// Corruption is logged at warn level.
    #[must_use]
    pub fn load(&self) -> Option<PersistedSnapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "ignoring unreadable snapshot");
                None
            }
        }
    }

    /// Reads the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when the file exists but cannot be read
    /// or decoded. A missing file yields `Ok(None)`.
    pub fn try_load(&self) -> Result<Option<PersistedSnapshot>, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path, "no snapshot to restore");
                return Ok(None);
            }
            Err(error) => return Err(self.io_error(&error)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| PersistenceError::Json {
                path: self.path.to_string(),
                message: error.to_string(),
            })
    }

    /// Writes the snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] when encoding, writing, syncing or
    /// renaming fails. The previous snapshot, if any, is left intact.
    pub fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(snapshot).map_err(|error| PersistenceError::Json {
            path: self.path.to_string(),
            message: error.to_string(),
        })?;

        if let Some(parent) = self.parent() {
            std::fs::create_dir_all(parent).map_err(|error| self.io_error(&error))?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|error| self.io_error(&error))?;
            file.write_all(&bytes)
                .map_err(|error| self.io_error(&error))?;
            file.sync_all().map_err(|error| self.io_error(&error))?;
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|error| self.io_error(&error))?;

        if let Some(parent) = self.parent() {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(|error| self.io_error(&error))?;
        }

        Ok(())
    }

    fn parent(&self) -> Option<&Utf8Path> {
        self.path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
    }

    fn tmp_path(&self) -> Utf8PathBuf {
        let mut tmp = self.path.clone().into_string();
        tmp.push_str(".tmp");
        Utf8PathBuf::from(tmp)
    }

    fn io_error(&self, error: &std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::{PersistedSnapshot, SnapshotFile};
    use crate::github::models::test_support::record;
    use crate::persistence::PersistenceError;

    struct SnapshotFixture {
        _dir: TempDir,
        file: SnapshotFile,
    }

    #[fixture]
    fn snapshot_fixture() -> SnapshotFixture {
        let dir = TempDir::new().expect("temp dir should be created");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("nested").join("snapshot.json"))
            .expect("temp path should be UTF-8");
        SnapshotFixture {
            _dir: dir,
            file: SnapshotFile::new(path),
        }
    }

    #[rstest]
    fn saved_snapshot_loads_back(snapshot_fixture: SnapshotFixture) {
        let snapshot = PersistedSnapshot {
            as_of: 1_735_689_600_000,
            records: vec![record("octo/widgets", 1), record("octo/widgets", 2)],
        };

        snapshot_fixture
            .file
            .save(&snapshot)
            .expect("snapshot should save");

        assert_eq!(snapshot_fixture.file.load(), Some(snapshot));
        assert!(!snapshot_fixture.file.tmp_path().exists());
    }

    #[rstest]
    fn missing_file_is_not_an_error(snapshot_fixture: SnapshotFixture) {
        assert_eq!(snapshot_fixture.file.try_load(), Ok(None));
    }

    #[rstest]
    fn corrupt_file_is_reported_and_ignored(snapshot_fixture: SnapshotFixture) {
        let path = snapshot_fixture.file.path();
        std::fs::create_dir_all(path.parent().expect("parent")).expect("dir should exist");
        std::fs::write(path, b"{\"asOf\": 12, \"records\": [").expect("file should be written");

        assert!(matches!(
            snapshot_fixture.file.try_load(),
            Err(PersistenceError::Json { .. })
        ));
        assert_eq!(snapshot_fixture.file.load(), None);
    }

    #[rstest]
    fn snapshot_uses_camel_case_keys() {
        let snapshot = PersistedSnapshot {
            as_of: 42,
            records: vec![record("octo/widgets", 3)],
        };

        let json = serde_json::to_value(&snapshot).expect("snapshot should encode");

        assert_eq!(json.get("asOf"), Some(&serde_json::json!(42)));
        let first = json
            .get("records")
            .and_then(|records| records.get(0))
            .expect("one record");
        assert_eq!(first.get("headRef"), Some(&serde_json::json!("feature/3")));
        assert_eq!(first.get("reason"), Some(&serde_json::json!("author")));
    }
}
