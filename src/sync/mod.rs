//! Sync Service
//!
//! Reconciles the local log with the remote authority.
//!
//! ```text
//!            ┌──────────┐ push pending ┌──────────────┐
//!  Idle ───► │ Syncing  │─────────────►│  authority   │
//!            │          │◄─────────────│ (ordered log)│
//!            └────┬─────┘ pull since   └──────────────┘
//!                 │       watermark / all
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!     Success            Error   (local state untouched)
//! ```
//!
//! The pull is incremental when the stored cache-version marker equals
//! [`CACHE_VERSION`] and full otherwise.

mod http;
mod remote;
mod service;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;

pub use http::HttpAuthority;
pub use remote::{AppendAck, MemoryAuthority, RemoteAuthority, RemotePage};
pub use service::SyncService;

/// Bumped whenever a build changes how the local log must be interpreted;
/// devices holding an older marker resync in full.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authority did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("authority returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error(transparent)]
    Local(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Incremental,
    Full,
}

/// Observable state of the sync service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success {
        at: DateTime<Utc>,
        pushed: usize,
        pulled: usize,
        mode: SyncMode,
    },
    Error {
        message: String,
        at: DateTime<Utc>,
    },
}

impl SyncStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error { .. })
    }
}

/// What one completed pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub pushed: usize,
    /// Pushed events the authority already had
    pub duplicates: usize,
    pub pulled: usize,
    pub compacted: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another pass was already running; it runs once more after it ends,
    /// whether it succeeded or failed
    Coalesced,
}
