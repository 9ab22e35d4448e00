//! Versioned snapshot of derived state at a cutoff instant

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::event::Event;
use super::goal::Goal;
use super::grouping::{Grouping, Reflection};
use super::node::{EventMark, FacetLabel};
use super::state::{Counters, Diagnostics, DerivedState};

/// A checkpoint produced by compaction
///
/// Indexes are left out: they are rebuilt from the entity maps on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Version of the derivation logic that produced this snapshot
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Every folded event has a timestamp at or before this instant
    pub cutoff: DateTime<Utc>,
    /// Log entries folded in, across all compactions so far
    pub compacted_event_count: u64,
    pub goals: BTreeMap<String, Goal>,
    pub groupings: BTreeMap<String, Grouping>,
    pub reflections: BTreeMap<String, Reflection>,
    #[serde(default)]
    pub facets: BTreeMap<String, FacetLabel>,
    pub counters: Counters,
    #[serde(default)]
    pub diagnostics: Diagnostics,
    /// Needed for streaks that span the cutoff
    #[serde(default)]
    pub activity_days: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub events_folded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_folded: Option<EventMark>,
    /// Folded events with no entity to record them on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained_events: Vec<Event>,
}

impl Snapshot {
    /// Current version of the snapshot format and derivation rules
    pub const CURRENT_VERSION: u32 = 1;

    /// Capture a derived state
    ///
    /// Returns `None` when `cutoff` is after `created_at`.
    pub fn capture(
        state: &DerivedState,
        cutoff: DateTime<Utc>,
        compacted_event_count: u64,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        if cutoff > created_at {
            return None;
        }
        Some(Self {
            version: Self::CURRENT_VERSION,
            created_at,
            cutoff,
            compacted_event_count,
            goals: state.goals.clone(),
            groupings: state.groupings.clone(),
            reflections: state.reflections.clone(),
            facets: state.facets.clone(),
            counters: state.counters,
            diagnostics: state.diagnostics.clone(),
            activity_days: state.activity_days.clone(),
            events_folded: state.events_folded,
            last_folded: state.last_folded.clone(),
            retained_events: state.retained_events.clone(),
        })
    }

    /// Rebuild the derived state this snapshot was taken from
    pub fn to_state(&self) -> DerivedState {
        let mut state = DerivedState {
            goals: self.goals.clone(),
            groupings: self.groupings.clone(),
            reflections: self.reflections.clone(),
            facets: self.facets.clone(),
            counters: self.counters,
            activity_days: self.activity_days.clone(),
            diagnostics: self.diagnostics.clone(),
            events_folded: self.events_folded,
            last_folded: self.last_folded.clone(),
            retained_events: self.retained_events.clone(),
            indexes: Default::default(),
        };
        state.rebuild_indexes();
        state
    }
}
