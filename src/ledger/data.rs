//! Moving data in and out of the ledger
//!
//! Compaction, export/import, legacy migration, and the push/pull hooks the
//! sync service drives. Every hook here finishes its writes before it
//! touches in-memory state, so a failure leaves the previous state intact.

use std::path::Path;

use tracing::{info, warn};

use crate::event_store::{
    build_export, compact, migration, read_export, write_export, ExportDocument, MigrationReport,
    SyncState,
};
use crate::sync::CACHE_VERSION;
use crate::types::{Event, EventSource};

use super::{Ledger, LedgerResult};

impl Ledger {
    /// Compact when the log has reached the configured threshold
    ///
    /// Returns the number of log entries folded into the new snapshot.
    pub fn maybe_compact(&mut self) -> LedgerResult<Option<usize>> {
        if !self.config.compaction.should_compact(self.log.len()) {
            return Ok(None);
        }
        self.compact_now()
    }

    /// Compact regardless of the threshold
    pub fn compact_now(&mut self) -> LedgerResult<Option<usize>> {
        let now = self.clock.now();
        let cutoff = self.config.compaction.cutoff(now, self.log.earliest_pending());
        let Some(compaction) = compact(self.log.events(), self.snapshot.as_ref(), cutoff, now) else {
            return Ok(None);
        };

        // Snapshot first: until the log is rewritten, seeded derivation
        // simply skips the events it already holds.
        self.snapshots.save(&compaction.snapshot)?;
        self.log.replace_all(compaction.tail)?;
        self.snapshot = Some(compaction.snapshot);
        self.invalidate();

        info!(compacted = compaction.compacted, %cutoff, remaining = self.log.len(), "log compacted");
        Ok(Some(compaction.compacted))
    }

    /// The full, decompacted history
    pub fn export(&self) -> LedgerResult<ExportDocument> {
        Ok(build_export(self.snapshot.as_ref(), self.log.events(), self.clock.now())?)
    }

    /// Write the full history to `path`; returns the number of events written
    pub fn export_to<P: AsRef<Path>>(&self, path: P) -> LedgerResult<usize> {
        let document = self.export()?;
        write_export(path.as_ref(), &document)?;
        info!(events = document.events.len(), path = %path.as_ref().display(), "exported");
        Ok(document.events.len())
    }

    /// Merge an export into the log and queue the new events for push
    pub fn import(&mut self, document: ExportDocument) -> LedgerResult<usize> {
        document.validate()?;
        let fresh: Vec<Event> = {
            let state = self.state();
            let folded = state.folded_ids();
            let cutoff = self.snapshot.as_ref().map(|s| s.cutoff);
            document
                .events
                .into_iter()
                .filter(|e| !(cutoff.is_some_and(|c| e.timestamp <= c) && folded.contains(e.client_id.as_str())))
                .map(|e| e.with_source(EventSource::Import))
                .collect()
        };

        let added = self.log.merge(fresh, true)?;
        if added > 0 {
            self.invalidate();
        }
        info!(added, "imported");
        Ok(added)
    }

    pub fn import_from<P: AsRef<Path>>(&mut self, path: P) -> LedgerResult<usize> {
        let document = read_export(path)?;
        self.import(document)
    }

    /// Bootstrap from a legacy flat-state file
    ///
    /// Synthesized events carry deterministic ids, so importing the same
    /// file twice adds nothing the second time.
    pub fn import_legacy<P: AsRef<Path>>(&mut self, path: P) -> LedgerResult<MigrationReport> {
        let legacy = migration::read_legacy(path)?;
        let migrated = migration::migrate(&legacy)?;

        let added = self.log.merge(migrated.events, true)?;
        if added > 0 {
            self.invalidate();
        }
        info!(added, goals = migrated.report.goals, "legacy state imported");
        Ok(migrated.report)
    }

    /// Events not yet acknowledged by the authority
    pub fn pending_events(&self) -> Vec<Event> {
        self.log.pending_events()
    }

    /// Clear the pending marker of events the authority now holds
    pub fn confirm<'a>(&mut self, client_ids: impl IntoIterator<Item = &'a str>) -> LedgerResult<usize> {
        Ok(self.log.mark_confirmed(client_ids)?)
    }

    /// Merge pulled events and advance the watermark
    pub fn apply_incremental(&mut self, events: Vec<Event>, high_water: u64) -> LedgerResult<usize> {
        let added = self.log.merge(events, false)?;
        let watermark = high_water.max(self.log.sync_state().watermark);
        self.commit_sync_state(watermark)?;
        if added > 0 {
            self.invalidate();
        }
        Ok(added)
    }

    /// Replace the local history with the authority's log
    ///
    /// Local events the authority has not acknowledged yet are kept and stay
    /// queued. The snapshot goes: the new log is complete on its own.
    pub fn apply_full(&mut self, remote: Vec<Event>, high_water: u64) -> LedgerResult<usize> {
        let pulled = remote.len();
        let pending = self.log.pending_events();
        let kept = pending.len();

        let mut events = remote;
        events.extend(pending);
        self.log.replace_all(events)?;
        // The new log no longer matches the snapshot, whether or not its
        // files can be removed
        let had_snapshot = self.snapshot.take().is_some();
        self.invalidate();
        if had_snapshot || self.snapshots.exists() {
            self.snapshots.clear()?;
        }
        self.commit_sync_state(high_water)?;

        if kept > 0 {
            warn!(kept, "local events still waiting for the authority after full sync");
        }
        info!(pulled, "local log replaced from authority");
        Ok(pulled)
    }

    fn commit_sync_state(&mut self, watermark: u64) -> LedgerResult<()> {
        let state = SyncState {
            watermark,
            cache_version: Some(CACHE_VERSION),
            last_synced_at: Some(self.clock.now()),
        };
        self.log.save_sync_state(state)?;
        Ok(())
    }
}
