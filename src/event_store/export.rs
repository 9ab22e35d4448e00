//! Export and import of the full event history
//!
//! An export is the decompacted snapshot plus the raw log, deduplicated and
//! in derivation order, wrapped in a small versioned envelope:
//!
//! ```json
//! { "format": "life-ledger-export", "version": 1,
//!   "exportedAt": "2024-05-01T08:00:00Z", "events": [ ... ] }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derive::ordered_unique;
use crate::types::{Event, Snapshot};
use crate::utils::{atomic_write_json, AtomicError};

use super::compaction::decompact;

pub const EXPORT_FORMAT: &str = "life-ledger-export";
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write export: {0}")]
    Write(#[from] AtomicError),
    #[error("not a valid export document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("could not rebuild events from snapshot: {0}")]
    Rebuild(#[source] serde_json::Error),
    #[error("unrecognized export format {0:?}")]
    UnsupportedFormat(String),
    #[error("export version {0} is newer than this build supports")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub format: String,
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

impl ExportDocument {
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.format != EXPORT_FORMAT {
            return Err(ExportError::UnsupportedFormat(self.format.clone()));
        }
        if self.version > EXPORT_VERSION {
            return Err(ExportError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Assemble the complete history from a snapshot and the tail log
pub fn build_export(
    snapshot: Option<&Snapshot>,
    log: &[Event],
    exported_at: DateTime<Utc>,
) -> Result<ExportDocument, ExportError> {
    let mut all = match snapshot {
        Some(snapshot) => decompact(snapshot).map_err(ExportError::Rebuild)?,
        None => Vec::new(),
    };
    all.extend(log.iter().cloned());
    // A late event can sit in both the snapshot and the log
    let events = ordered_unique(&all).into_iter().cloned().collect();

    Ok(ExportDocument {
        format: EXPORT_FORMAT.to_string(),
        version: EXPORT_VERSION,
        exported_at,
        events,
    })
}

pub fn write_export<P: AsRef<Path>>(path: P, document: &ExportDocument) -> Result<(), ExportError> {
    atomic_write_json(path, document)?;
    Ok(())
}

pub fn read_export<P: AsRef<Path>>(path: P) -> Result<ExportDocument, ExportError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let document: ExportDocument = serde_json::from_str(&raw)?;
    document.validate()?;
    Ok(document)
}
