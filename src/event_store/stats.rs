//! Storage statistics
//!
//! - Event counts by type in the local log
//! - Pending (unpushed) and compacted counts
//! - On-disk sizes of the log and the snapshot

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::types::Snapshot;

use super::store::EventLog;

/// Snapshot of the ledger's storage footprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    /// Events currently in the local log (the uncompacted tail)
    pub log_events: usize,
    /// Events folded into the snapshot across all compactions
    pub compacted_events: u64,
    pub pending_events: usize,
    /// Lines of the log file that could not be parsed
    pub skipped_lines: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub log_size: u64,
    pub snapshot_size: u64,
    pub backup_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<u32>,
}

impl LedgerStats {
    /// Events represented in total, compacted or not
    pub fn total_events(&self) -> u64 {
        self.compacted_events + self.log_events as u64
    }

    pub fn total_size(&self) -> u64 {
        self.log_size + self.snapshot_size + self.backup_size
    }

    /// Format size in human-readable format
    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}

/// Collects [`LedgerStats`] from an open log and the loaded snapshot
pub struct StatsCollector<'a> {
    log: &'a EventLog,
    snapshot: Option<&'a Snapshot>,
}

impl<'a> StatsCollector<'a> {
    pub fn new(log: &'a EventLog, snapshot: Option<&'a Snapshot>) -> Self {
        Self { log, snapshot }
    }

    pub fn collect(&self) -> LedgerStats {
        let config = self.log.config();
        let mut events_by_type = BTreeMap::new();
        for event in self.log.events() {
            *events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        LedgerStats {
            log_events: self.log.len(),
            compacted_events: self.snapshot.map_or(0, |s| s.compacted_event_count),
            pending_events: self.log.pending_count(),
            skipped_lines: self.log.skipped_lines(),
            events_by_type,
            log_size: file_size(&config.events_path()),
            snapshot_size: file_size(&config.snapshot_path()),
            backup_size: file_size(&config.previous_snapshot_path()),
            snapshot_version: self.snapshot.map(|s| s.version),
        }
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
