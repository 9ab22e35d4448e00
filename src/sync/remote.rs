//! The remote authority seam
//!
//! The authority is a plain ordered log: it numbers events in arrival order
//! and refuses a second copy of any client id. It runs no business logic.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event_store::{StorageError, StorageResult};
use crate::types::Event;

use super::SyncError;

/// Events returned by a list call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePage {
    pub events: Vec<Event>,
    /// Arrival sequence of the newest event the authority holds
    pub high_water: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendAck {
    pub inserted: usize,
    pub duplicates: usize,
    pub high_water: u64,
}

#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// The whole log, in arrival order
    async fn list_all(&self) -> Result<RemotePage, SyncError>;

    /// Events that arrived after `watermark`
    async fn list_since(&self, watermark: u64) -> Result<RemotePage, SyncError>;

    /// Insert events whose client id is not yet present
    async fn append(&self, events: Vec<Event>) -> Result<AppendAck, SyncError>;
}

#[derive(Default)]
struct AuthorityLog {
    /// Arrival sequence of `events[i]` is `i + 1`
    events: Vec<Event>,
    ids: HashSet<String>,
}

/// In-process authority, optionally persisted to a JSON Lines file
///
/// Backs the `ledger-authority` server and stands in for it in tests.
/// `fail_next` and `set_delay` inject faults into the async interface.
#[derive(Default)]
pub struct MemoryAuthority {
    log: Mutex<AuthorityLog>,
    path: Option<PathBuf>,
    fail_next: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    requests: AtomicUsize,
}

impl MemoryAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or create) a persisted authority log
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut log = AuthorityLog::default();

        if path.exists() {
            let file = File::open(&path).map_err(|source| StorageError::Read {
                path: path.clone(),
                source,
            })?;
            for (index, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|source| StorageError::Read {
                    path: path.clone(),
                    source,
                })?;
                if line.trim().is_empty() {
                    continue;
                }
                match Event::from_json_line(&line) {
                    Ok(event) if log.ids.insert(event.client_id.clone()) => log.events.push(event),
                    Ok(_) => {}
                    Err(e) => warn!(line = index + 1, error = %e, "skipping unreadable authority line"),
                }
            }
        } else if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        info!(path = %path.display(), events = log.events.len(), "authority log opened");
        Ok(Self {
            log: Mutex::new(log),
            path: Some(path),
            ..Default::default()
        })
    }

    pub fn len(&self) -> usize {
        self.log.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn high_water(&self) -> u64 {
        self.len() as u64
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().events.clone()
    }

    pub fn page_all(&self) -> RemotePage {
        let log = self.log.lock();
        RemotePage {
            events: log.events.clone(),
            high_water: log.events.len() as u64,
        }
    }

    pub fn page_since(&self, watermark: u64) -> RemotePage {
        let log = self.log.lock();
        let start = usize::try_from(watermark).unwrap_or(usize::MAX).min(log.events.len());
        RemotePage {
            events: log.events[start..].to_vec(),
            high_water: log.events.len() as u64,
        }
    }

    /// Append unseen events, persisting them before they become visible
    pub fn insert(&self, events: Vec<Event>) -> StorageResult<AppendAck> {
        let mut log = self.log.lock();
        let mut batch_ids = HashSet::new();
        let total = events.len();
        let fresh: Vec<Event> = events
            .into_iter()
            .filter(|e| !log.ids.contains(&e.client_id) && batch_ids.insert(e.client_id.clone()))
            .collect();

        if let Some(path) = &self.path {
            persist(path, &fresh)?;
        }

        let inserted = fresh.len();
        log.ids.extend(batch_ids);
        log.events.extend(fresh);
        debug!(inserted, duplicates = total - inserted, "authority append");
        Ok(AppendAck {
            inserted,
            duplicates: total - inserted,
            high_water: log.events.len() as u64,
        })
    }

    /// Make the next `count` async calls fail with a network error
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delay every async call, to exercise timeouts and overlap
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Async calls served so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> Result<(), SyncError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SyncError::Network("connection reset (injected)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteAuthority for MemoryAuthority {
    async fn list_all(&self) -> Result<RemotePage, SyncError> {
        self.before_call().await?;
        Ok(self.page_all())
    }

    async fn list_since(&self, watermark: u64) -> Result<RemotePage, SyncError> {
        self.before_call().await?;
        Ok(self.page_since(watermark))
    }

    async fn append(&self, events: Vec<Event>) -> Result<AppendAck, SyncError> {
        self.before_call().await?;
        self.insert(events).map_err(|e| SyncError::Remote {
            status: 500,
            message: e.to_string(),
        })
    }
}

fn persist(path: &Path, events: &[Event]) -> StorageResult<()> {
    if events.is_empty() {
        return Ok(());
    }
    let mut buf = String::new();
    for event in events {
        let line = event.to_json_line().map_err(|source| StorageError::Encode {
            client_id: event.client_id.clone(),
            source,
        })?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let write = || -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_all()
    };
    write().map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}
