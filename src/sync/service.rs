//! One sync pass: push pending → pull → apply-then-commit → maybe compact

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::ledger::SharedLedger;

use super::remote::RemoteAuthority;
use super::{SyncError, SyncMode, SyncOutcome, SyncReport, SyncStatus, CACHE_VERSION};

pub struct SyncService {
    ledger: SharedLedger,
    remote: Arc<dyn RemoteAuthority>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    status: watch::Sender<SyncStatus>,
    running: AtomicBool,
    rerun: AtomicBool,
}

/// Clears the running flag even if the pass is cancelled
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncService {
    /// Uses the ledger's clock and its configured `sync_timeout`
    pub fn new(ledger: SharedLedger, remote: Arc<dyn RemoteAuthority>) -> Self {
        let (clock, timeout) = {
            let guard = ledger.lock();
            (guard.clock(), guard.config().sync_timeout)
        };
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            ledger,
            remote,
            clock,
            timeout,
            status,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Run a sync in the background (app foregrounded, local mutation, ...)
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<Result<SyncOutcome, SyncError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.sync().await })
    }

    /// Run a sync now, or fold into the one already running
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            self.rerun.store(true, Ordering::SeqCst);
            debug!("sync already in flight; request coalesced");
            return Ok(SyncOutcome::Coalesced);
        }
        let _guard = RunGuard(&self.running);

        loop {
            self.rerun.store(false, Ordering::SeqCst);
            let result = self.run_pass().await;
            if self.rerun.load(Ordering::SeqCst) {
                debug!(failed = result.is_err(), "running again for a request that arrived mid-pass");
                continue;
            }
            return result.map(SyncOutcome::Completed);
        }
    }

    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        self.status.send_replace(SyncStatus::Syncing);
        match self.pass().await {
            Ok(report) => {
                info!(
                    mode = ?report.mode,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    duplicates = report.duplicates,
                    "sync complete"
                );
                self.status.send_replace(SyncStatus::Success {
                    at: self.clock.now(),
                    pushed: report.pushed,
                    pulled: report.pulled,
                    mode: report.mode,
                });
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "sync failed; local data kept as is");
                self.status.send_replace(SyncStatus::Error {
                    message: e.to_string(),
                    at: self.clock.now(),
                });
                Err(e)
            }
        }
    }

    async fn pass(&self) -> Result<SyncReport, SyncError> {
        let pending = self.ledger.lock().pending_events();
        let pushed = pending.len();
        let mut duplicates = 0;
        if !pending.is_empty() {
            let ids: Vec<String> = pending.iter().map(|e| e.client_id.clone()).collect();
            let ack = self.bounded(self.remote.append(pending)).await?;
            duplicates = ack.duplicates;
            self.ledger.lock().confirm(ids.iter().map(String::as_str))?;
        }

        let (mode, watermark) = {
            let ledger = self.ledger.lock();
            let state = ledger.sync_state();
            let mode = if state.cache_version == Some(CACHE_VERSION) {
                SyncMode::Incremental
            } else {
                SyncMode::Full
            };
            (mode, state.watermark)
        };
        debug!(?mode, watermark, "pulling");

        // Nothing local changes until the whole page is in hand
        let page = match mode {
            SyncMode::Incremental => self.bounded(self.remote.list_since(watermark)).await?,
            SyncMode::Full => self.bounded(self.remote.list_all()).await?,
        };

        let mut ledger = self.ledger.lock();
        let pulled = match mode {
            SyncMode::Incremental => ledger.apply_incremental(page.events, page.high_water)?,
            SyncMode::Full => ledger.apply_full(page.events, page.high_water)?,
        };
        let compacted = match ledger.maybe_compact() {
            Ok(compacted) => compacted,
            Err(e) => {
                warn!(error = %e, "compaction after sync failed");
                None
            }
        };
        ledger.state();

        Ok(SyncReport {
            mode,
            pushed,
            duplicates,
            pulled,
            compacted,
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, SyncError>>) -> Result<T, SyncError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SyncError::Timeout(self.timeout))?
    }
}
