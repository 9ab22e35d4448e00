//! Life Ledger
//!
//! Event-sourced persistence and multi-device sync for personal life
//! tracking: goals, their journal entries, periodic reflections, and the
//! groupings that organize them.
//!
//! # Features
//!
//! - **Append-only log**: every user action is an immutable event with a
//!   client-generated idempotency key
//! - **Pure derivation**: current state is a deterministic fold over the
//!   set of events, independent of arrival order and repeated delivery
//! - **Compaction**: old, acknowledged events fold into a versioned snapshot
//!   that can be expanded back into events for export
//! - **Sync**: push/pull against one authoritative ordered log, incremental
//!   or full depending on the local cache-version marker
//! - **Legacy migration**: flat pre-event state becomes a synthetic,
//!   timestamp-faithful event log
//!
//! # Modules
//!
//! - `types`: events, entities, derived state, snapshots
//! - `derive`: the derivation engine
//! - `windows`: daily/weekly reset boundaries and usage caps
//! - `event_store`: local log, snapshot files, compaction, export, migration
//! - `ledger`: the per-device store object
//! - `sync`: the sync service and the remote authority seam
//! - `api`: HTTP routes of the authority server
//!
//! # Example
//!
//! ```no_run
//! use life_ledger::{Ledger, LedgerConfig, NewGoal};
//! use life_ledger::types::{Difficulty, DurationClass};
//!
//! let mut ledger = Ledger::open(LedgerConfig::with_data_dir("data")).unwrap();
//! let goal = ledger
//!     .start_goal(NewGoal::new("Run a 10k", DurationClass::Month, Difficulty::Hard))
//!     .unwrap();
//! ledger.nurture_goal(&goal, "first 3k without stopping").unwrap();
//! println!("available: {}", ledger.counters().available);
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod cues;
pub mod derive;
pub mod event_store;
pub mod ledger;
pub mod logging;
pub mod sync;
pub mod types;
pub mod utils;
pub mod windows;

#[cfg(test)]
mod test_support;

// Re-export commonly used items at crate root
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{AuthorityConfig, LedgerConfig};
pub use derive::derive_state;
pub use ledger::{Ledger, LedgerError, LedgerResult, NewGoal, SharedLedger};
pub use sync::{
    HttpAuthority, MemoryAuthority, RemoteAuthority, SyncError, SyncMode, SyncOutcome, SyncService,
    SyncStatus,
};
pub use types::{DerivedState, Event, EventType, Snapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
