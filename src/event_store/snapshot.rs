//! Snapshot Manager
//!
//! Persists the compaction checkpoint in `snapshot.json`. Saving moves the
//! current file to `snapshot.previous.json` first, so one bad write can
//! always fall back to the checkpoint before it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::types::Snapshot;
use crate::utils::{atomic_write_json, safe_rename, temp_path, AtomicError};

use super::store::EventStoreConfig;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not save snapshot: {0}. Export your data now")]
    Save(#[from] AtomicError),
    #[error("could not remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of loading the persisted snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotLoad {
    Loaded(Snapshot),
    /// The primary file was unreadable; this is the backup
    Recovered(Snapshot),
    Missing,
    /// Written by different derivation rules and ignored
    Discarded { found_version: Option<u64> },
}

impl SnapshotLoad {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            SnapshotLoad::Loaded(s) | SnapshotLoad::Recovered(s) => Some(s),
            SnapshotLoad::Missing | SnapshotLoad::Discarded { .. } => None,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            SnapshotLoad::Loaded(s) | SnapshotLoad::Recovered(s) => Some(s),
            SnapshotLoad::Missing | SnapshotLoad::Discarded { .. } => None,
        }
    }

    /// Whether local history older than the tail may be missing
    ///
    /// True when a snapshot existed but could not be used as written. The
    /// events it covered are no longer in the local log, so only a full
    /// pull from the authority restores them.
    pub fn needs_full_sync(&self) -> bool {
        matches!(self, SnapshotLoad::Recovered(_) | SnapshotLoad::Discarded { .. })
    }
}

enum ReadOutcome {
    Ok(Snapshot),
    Missing,
    WrongVersion(Option<u64>),
    Unreadable(String),
}

/// Snapshot Manager handles saving and loading the checkpoint
pub struct SnapshotManager {
    config: EventStoreConfig,
}

impl SnapshotManager {
    pub fn new(config: EventStoreConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> PathBuf {
        self.config.snapshot_path()
    }

    pub fn previous_path(&self) -> PathBuf {
        self.config.previous_snapshot_path()
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Durably write `snapshot`, keeping the old one as backup
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let latest = self.path();
        // Staged next to the target so the final step is a rename
        let staged = staged_path(&latest);
        atomic_write_json(&staged, snapshot)?;
        safe_rename(&staged, &latest, Some(self.previous_path()))?;

        info!(
            cutoff = %snapshot.cutoff,
            compacted = snapshot.compacted_event_count,
            goals = snapshot.goals.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot, falling back to the backup when the primary is unreadable
    pub fn load(&self) -> SnapshotLoad {
        match read_snapshot(&self.path()) {
            ReadOutcome::Ok(snapshot) => SnapshotLoad::Loaded(snapshot),
            ReadOutcome::Missing => SnapshotLoad::Missing,
            ReadOutcome::WrongVersion(found_version) => {
                warn!(?found_version, expected = Snapshot::CURRENT_VERSION, "discarding snapshot from other derivation rules");
                SnapshotLoad::Discarded { found_version }
            }
            ReadOutcome::Unreadable(reason) => {
                warn!(%reason, "snapshot unreadable, trying backup");
                match read_snapshot(&self.previous_path()) {
                    ReadOutcome::Ok(snapshot) => {
                        info!(cutoff = %snapshot.cutoff, "recovered snapshot from backup");
                        SnapshotLoad::Recovered(snapshot)
                    }
                    ReadOutcome::WrongVersion(found_version) => SnapshotLoad::Discarded { found_version },
                    ReadOutcome::Missing | ReadOutcome::Unreadable(_) => {
                        warn!("no usable snapshot backup");
                        SnapshotLoad::Discarded { found_version: None }
                    }
                }
            }
        }
    }

    /// Remove both the snapshot and its backup
    pub fn clear(&self) -> Result<(), SnapshotError> {
        for path in [self.path(), self.previous_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(SnapshotError::Remove { path, source }),
            }
        }
        Ok(())
    }
}

fn staged_path(latest: &Path) -> PathBuf {
    let mut staged = temp_path(latest);
    staged.set_extension("new");
    staged
}

fn read_snapshot(path: &Path) -> ReadOutcome {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return ReadOutcome::Missing,
        Err(e) => return ReadOutcome::Unreadable(e.to_string()),
    };
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => return ReadOutcome::Unreadable(e.to_string()),
    };
    // Check the version before the shape: a future format may not parse at all
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(Snapshot::CURRENT_VERSION)) {
        return ReadOutcome::WrongVersion(version);
    }
    match serde_json::from_value(value) {
        Ok(snapshot) => ReadOutcome::Ok(snapshot),
        Err(e) => ReadOutcome::Unreadable(e.to_string()),
    }
}
