//! Data types for the life ledger
//!
//! Events are the source of truth; everything else in this module is either
//! a payload carried by an event or part of the state derived from them.

mod event;
mod goal;
mod grouping;
mod node;
mod snapshot;
mod state;

pub use event::{
    Event, EventPayload, EventSource, EventType, GoalAbandonedData, GoalConcludedData,
    GoalNurturedData, GoalStartedData, GroupingCreatedData, NodeRelabeledData,
    ReflectionRecordedData,
};
pub use goal::{
    Difficulty, DurationClass, Goal, GoalState, NurtureEntry, ResultTier, Rewards,
};
pub use grouping::{Grouping, Reflection};
pub use node::{EventMark, FacetLabel, NodeKind, NodeRef};
pub use snapshot::Snapshot;
pub use state::{Counters, DerivedState, Diagnostics, Indexes, INITIAL_CAPACITY};
