//! Event Store Module
//!
//! Local persistence for the ledger:
//! - `EventLog`: append-only event log plus pending and sync markers
//! - `SnapshotManager`: the compaction checkpoint and its backup
//! - `compaction`: folding old events into a snapshot, and back out again
//! - `export`: the complete-history interchange document
//! - `migration`: bootstrapping from the legacy flat-state format
//! - `StatsCollector`: storage statistics
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//! ┌─────────┐    ┌──────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │ action  │───►│ pending.json │───►│ events.jsonl│───►│ maybe_compact()     │
//! │         │    │ mark unpushed│    │ append+fsync│    │ snapshot + rewrite  │
//! └─────────┘    └──────────────┘    └─────────────┘    └─────────────────────┘
//!
//! Read Path (Startup):
//! ┌───────────────┐    ┌─────────────────┐
//! │ Load snapshot │───►│ Fold tail events│───► Ready!
//! │ (snapshot.json│    │ on top of it    │
//! └───────────────┘    └─────────────────┘
//! ```

pub mod compaction;
pub mod export;
pub mod migration;
mod snapshot;
mod stats;
mod store;

pub use compaction::{compact, decompact, Compaction, CompactionPolicy};
pub use export::{build_export, read_export, write_export, ExportDocument, ExportError};
pub use migration::{migrate, LegacyState, Migration, MigrationError, MigrationReport};
pub use snapshot::{SnapshotError, SnapshotLoad, SnapshotManager};
pub use stats::{LedgerStats, StatsCollector};
pub use store::{EventLog, EventStoreConfig, StorageError, StorageResult, SyncState};
