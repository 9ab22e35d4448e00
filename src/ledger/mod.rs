//! Ledger - the store object
//!
//! Owns the local log, the loaded snapshot and the cached derived state for
//! one device. Everything the UI does goes through it:
//!
//! - `actions`: validate a user action, turn it into an event, append it
//! - `queries`: read accessors over the derived state and the usage windows
//! - `data`: compaction, export/import, legacy migration and the hooks the
//!   sync service uses to push and pull
//!
//! A `Ledger` is single-writer. Share it with the sync task behind a
//! `parking_lot::Mutex` (see [`SharedLedger`]).

mod actions;
mod data;
mod queries;

use std::cell::RefCell;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::cues::RecentlyShown;
use crate::derive::derive_state;
use crate::event_store::{
    EventLog, ExportError, LedgerStats, MigrationError, SnapshotError, SnapshotLoad,
    SnapshotManager, StorageError,
};
use crate::types::{DerivedState, Snapshot};
use crate::windows::{Allowance, WindowCache};

pub use actions::NewGoal;

/// Ledger shared between the UI thread and the sync task
pub type SharedLedger = Arc<parking_lot::Mutex<Ledger>>;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("could not encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("goal {0} does not exist")]
    GoalNotFound(String),
    #[error("goal {0} is no longer active")]
    GoalNotActive(String),
    #[error("grouping {0} does not exist")]
    GroupingNotFound(String),
    #[error("goal costs {cost} but only {available} is available")]
    InsufficientBalance { cost: u32, available: u32 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// The local ledger of one device
pub struct Ledger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    log: EventLog,
    snapshots: SnapshotManager,
    snapshot: Option<Snapshot>,
    state: RefCell<Option<Arc<DerivedState>>>,
    allowances: RefCell<WindowCache<Allowance>>,
    cues: RecentlyShown,
}

impl Ledger {
    pub fn open(config: LedgerConfig) -> LedgerResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the ledger under `config.data_dir`
    ///
    /// A snapshot that had to be recovered from its backup, or was dropped
    /// for a version mismatch, no longer lines up with the local tail. The
    /// cache-version marker is cleared so the next sync is a full one.
    pub fn open_with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let mut log = EventLog::open(config.store_config())?;
        let snapshots = SnapshotManager::new(config.store_config());

        let load = snapshots.load();
        if load.needs_full_sync() {
            warn!("local snapshot unusable as-is; the next sync will be a full one");
            let mut sync_state = log.sync_state().clone();
            sync_state.cache_version = None;
            log.save_sync_state(sync_state)?;
        }
        if let SnapshotLoad::Discarded { found_version } = &load {
            info!(?found_version, "replaying without snapshot");
        }
        let snapshot = load.into_snapshot();

        info!(
            data_dir = %config.data_dir.display(),
            events = log.len(),
            snapshot = snapshot.is_some(),
            device = %config.device,
            "ledger opened"
        );

        Ok(Self {
            config,
            clock,
            log,
            snapshots,
            snapshot,
            state: RefCell::new(None),
            allowances: RefCell::new(WindowCache::new()),
            cues: RecentlyShown::default(),
        })
    }

    /// Wrap for sharing with a [`crate::sync::SyncService`]
    pub fn into_shared(self) -> SharedLedger {
        Arc::new(parking_lot::Mutex::new(self))
    }

    /// Tear down
    ///
    /// Every write is already durable; this only reports what is left unpushed.
    pub fn close(self) {
        let stats = self.stats();
        if stats.pending_events > 0 {
            warn!(pending = stats.pending_events, "closing with events not yet pushed");
        }
        info!(
            events = stats.total_events(),
            size = %LedgerStats::format_size(stats.total_size()),
            "ledger closed"
        );
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Current derived state, recomputed only after the log changed
    pub fn state(&self) -> Arc<DerivedState> {
        if let Some(state) = self.state.borrow().as_ref() {
            return Arc::clone(state);
        }
        let state = Arc::new(derive_state(self.log.events(), self.snapshot.as_ref()));
        if !state.diagnostics.is_clean() {
            warn!(diagnostics = ?state.diagnostics, "log folded with problems");
        }
        *self.state.borrow_mut() = Some(Arc::clone(&state));
        state
    }

    fn invalidate(&mut self) {
        self.state.get_mut().take();
        self.allowances.get_mut().clear();
    }
}
