//! Event Log - local, append-only persistence
//!
//! The log keeps every event it has seen in `events.jsonl`, one JSON object
//! per line, fsynced on every append. Alongside it:
//!
//! - `pending.json`: client ids not yet acknowledged by the authority
//! - `sync_state.json`: watermark and cache-version marker
//!
//! Whole-file rewrites (full sync, compaction) go through the atomic
//! temp-file + rename path, so a crash never leaves a half-written log.

use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Event, EventSource};
use crate::utils::{atomic_write_json, atomic_write_with, cleanup_temp_files, AtomicError};

/// Where the ledger keeps its files
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub data_dir: PathBuf,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl EventStoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get path to events.jsonl
    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Backup of the snapshot replaced by the most recent compaction
    pub fn previous_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.previous.json")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join("pending.json")
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.data_dir.join("sync_state.json")
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Local storage failures
///
/// Write failures say so loudly: the log is the user's only local copy of
/// anything not yet pushed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not write {path}: {source}. Recent changes may not be saved; export your data now")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not replace a data file: {0}. Export your data now")]
    Replace(#[from] AtomicError),
    #[error("could not encode event {client_id}: {source}")]
    Encode {
        client_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persisted sync progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Authority arrival sequence of the last event pulled
    pub watermark: u64,
    /// Build constant stamped after a successful sync; absent forces a full sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingFile {
    client_ids: BTreeSet<String>,
}

/// The local event log
pub struct EventLog {
    config: EventStoreConfig,
    events: Vec<Event>,
    ids: HashSet<String>,
    pending: BTreeSet<String>,
    sync_state: SyncState,
    skipped_lines: usize,
}

impl EventLog {
    /// Open (or create) the log under `config.data_dir`
    pub fn open(config: EventStoreConfig) -> StorageResult<Self> {
        let dir = config.data_dir().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Write {
            path: dir.clone(),
            source,
        })?;
        let cleaned = cleanup_temp_files(&dir)?;
        if cleaned > 0 {
            warn!(cleaned, dir = %dir.display(), "removed files left by an interrupted write");
        }

        let mut log = Self {
            config,
            events: Vec::new(),
            ids: HashSet::new(),
            pending: BTreeSet::new(),
            sync_state: SyncState::default(),
            skipped_lines: 0,
        };
        log.load_events()?;
        log.load_pending()?;
        log.load_sync_state()?;

        info!(
            events = log.events.len(),
            pending = log.pending.len(),
            watermark = log.sync_state.watermark,
            "event log opened"
        );
        Ok(log)
    }

    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }

    /// Events in append order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.ids.contains(client_id)
    }

    /// Lines in `events.jsonl` that could not be parsed on open
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Latest timestamp among events recorded on `device`
    ///
    /// Pulled and imported events are left out: another device's clock says
    /// nothing about this one.
    pub fn latest_recorded_by(&self, device: &str) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .filter(|e| e.source == EventSource::Device && e.device.as_deref() == Some(device))
            .map(|e| e.timestamp)
            .max()
    }

    /// Append a locally recorded event and queue it for push
    ///
    /// Returns `false` when an event with the same client id is already in
    /// the log. The pending marker is written before the event line so that
    /// a crash in between can only leave a harmless stale marker.
    pub fn append(&mut self, event: Event) -> StorageResult<bool> {
        if self.contains(&event.client_id) {
            debug!(client_id = %event.client_id, "event already in log");
            return Ok(false);
        }
        self.pending.insert(event.client_id.clone());
        if let Err(e) = self.save_pending() {
            self.pending.remove(&event.client_id);
            return Err(e);
        }
        if let Err(e) = self.write_lines(std::slice::from_ref(&event)) {
            self.unqueue([&event.client_id]);
            return Err(e);
        }
        self.ids.insert(event.client_id.clone());
        self.events.push(event);
        Ok(true)
    }

    /// Add events received from elsewhere, skipping known client ids
    ///
    /// With `queue_for_push` the new events are also marked pending (import);
    /// otherwise they are treated as already held by the authority (pull).
    pub fn merge(&mut self, events: Vec<Event>, queue_for_push: bool) -> StorageResult<usize> {
        let mut seen = HashSet::new();
        let fresh: Vec<Event> = events
            .into_iter()
            .filter(|e| !self.ids.contains(&e.client_id) && seen.insert(e.client_id.clone()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        if queue_for_push {
            self.pending.extend(fresh.iter().map(|e| e.client_id.clone()));
            if let Err(e) = self.save_pending() {
                for event in &fresh {
                    self.pending.remove(&event.client_id);
                }
                return Err(e);
            }
        }
        if let Err(e) = self.write_lines(&fresh) {
            if queue_for_push {
                self.unqueue(fresh.iter().map(|e| &e.client_id));
            }
            return Err(e);
        }

        let added = fresh.len();
        self.ids.extend(fresh.iter().map(|e| e.client_id.clone()));
        self.events.extend(fresh);
        debug!(added, queue_for_push, "merged events into log");
        Ok(added)
    }

    /// Events not yet acknowledged by the authority, in log order
    pub fn pending_events(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| self.pending.contains(&e.client_id))
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, client_id: &str) -> bool {
        self.pending.contains(client_id)
    }

    /// Earliest timestamp among pending events
    pub fn earliest_pending(&self) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .filter(|e| self.pending.contains(&e.client_id))
            .map(|e| e.timestamp)
            .min()
    }

    /// Clear the pending marker of acknowledged events
    pub fn mark_confirmed<'a>(&mut self, client_ids: impl IntoIterator<Item = &'a str>) -> StorageResult<usize> {
        let before = self.pending.len();
        for id in client_ids {
            self.pending.remove(id);
        }
        let confirmed = before - self.pending.len();
        if confirmed > 0 {
            self.save_pending()?;
        }
        Ok(confirmed)
    }

    /// Atomically replace the whole log
    ///
    /// Pending markers survive only for client ids present in `events`.
    pub fn replace_all(&mut self, events: Vec<Event>) -> StorageResult<()> {
        let mut ids = HashSet::with_capacity(events.len());
        let events: Vec<Event> = events
            .into_iter()
            .filter(|e| ids.insert(e.client_id.clone()))
            .collect();

        let path = self.config.events_path();
        atomic_write_with(&path, |w| {
            for event in &events {
                let line = event.to_json_line().map_err(io::Error::from)?;
                writeln!(w, "{line}")?;
            }
            Ok(())
        })?;

        let before = self.pending.len();
        self.pending.retain(|id| ids.contains(id));
        if self.pending.len() != before {
            self.save_pending()?;
        }

        info!(events = events.len(), "event log rewritten");
        self.events = events;
        self.ids = ids;
        Ok(())
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync_state
    }

    pub fn save_sync_state(&mut self, state: SyncState) -> StorageResult<()> {
        atomic_write_json(self.config.sync_state_path(), &state)?;
        self.sync_state = state;
        Ok(())
    }

    // Drop pending marks whose event lines never reached the log
    fn unqueue<'a>(&mut self, client_ids: impl IntoIterator<Item = &'a String>) {
        for id in client_ids {
            self.pending.remove(id);
        }
        if let Err(e) = self.save_pending() {
            warn!(error = %e, "could not rewrite pending markers after a failed write");
        }
    }

    fn write_lines(&self, events: &[Event]) -> StorageResult<()> {
        let path = self.config.events_path();
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };

        let mut buf = String::new();
        for event in events {
            let line = event.to_json_line().map_err(|source| StorageError::Encode {
                client_id: event.client_id.clone(),
                source,
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        file.write_all(buf.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        Ok(())
    }

    fn save_pending(&self) -> StorageResult<()> {
        let file = PendingFile {
            client_ids: self.pending.clone(),
        };
        atomic_write_json(self.config.pending_path(), &file)?;
        Ok(())
    }

    fn load_events(&mut self) -> StorageResult<()> {
        let path = self.config.events_path();
        if !path.exists() {
            return Ok(());
        }
        let read_err = |source| StorageError::Read {
            path: path.clone(),
            source,
        };

        let reader = BufReader::new(File::open(&path).map_err(read_err)?);
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(read_err)?;
            if line.trim().is_empty() {
                continue;
            }
            match Event::from_json_line(&line) {
                Ok(event) => {
                    if self.ids.insert(event.client_id.clone()) {
                        self.events.push(event);
                    }
                }
                Err(e) => {
                    self.skipped_lines += 1;
                    warn!(line = line_num + 1, error = %e, "skipping unreadable log line");
                }
            }
        }
        Ok(())
    }

    fn load_pending(&mut self) -> StorageResult<()> {
        let path = self.config.pending_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(());
        };
        match serde_json::from_str::<PendingFile>(&raw) {
            Ok(file) => {
                // A marker whose event line never made it to disk is dropped
                self.pending = file
                    .client_ids
                    .into_iter()
                    .filter(|id| self.ids.contains(id))
                    .collect();
            }
            Err(e) => {
                // Re-pushing is idempotent, losing a pending marker is not
                warn!(error = %e, "pending list unreadable; queueing every event for push");
                self.pending = self.ids.iter().cloned().collect();
                self.save_pending()?;
            }
        }
        Ok(())
    }

    fn load_sync_state(&mut self) -> StorageResult<()> {
        let path = self.config.sync_state_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(());
        };
        match serde_json::from_str::<SyncState>(&raw) {
            Ok(state) => self.sync_state = state,
            Err(e) => {
                // Default state has no cache version, so the next sync is full
                warn!(error = %e, "sync state unreadable; next sync will be full");
            }
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
