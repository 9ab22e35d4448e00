//! Derived state: the in-memory projection of the event log

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::event::Event;
use super::goal::Goal;
use super::grouping::{Grouping, Reflection};
use super::node::{EventMark, FacetLabel};

/// Starting capacity and balance for a fresh log
pub const INITIAL_CAPACITY: u32 = 10;

/// Running counters that cannot be cheaply recomputed from entity data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub capacity: u32,
    pub available: u32,
    #[serde(default)]
    pub points: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            capacity: INITIAL_CAPACITY,
            available: INITIAL_CAPACITY,
            points: 0,
        }
    }
}

/// Problems found while folding the log
///
/// These never abort derivation; they are counted so that corruption stays
/// visible instead of being smoothed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Missing/invalid payload fields
    pub structural: u64,
    /// Events pointing at entities that do not exist (or are no longer active)
    pub reference: u64,
    /// Starts that would have driven the balance negative
    pub capacity: u64,
    /// Total balance those starts were short by
    pub capacity_shortfall: u64,
    /// Events of types this build does not know
    pub unknown: u64,
    /// Events at or before a snapshot cutoff that the snapshot had not seen
    pub late: u64,
}

impl Diagnostics {
    /// True when the log folded without any integrity problem
    ///
    /// Unknown types are forward compatibility, not a problem.
    pub fn is_clean(&self) -> bool {
        self.structural == 0 && self.reference == 0 && self.capacity == 0
    }
}

/// Cross-reference indexes, rebuilt from the entity maps after every fold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indexes {
    /// Parent grouping (None = root) → child grouping ids
    pub groupings_by_parent: BTreeMap<Option<String>, Vec<String>>,
    /// Parent grouping (None = root) → goal ids
    pub goals_by_grouping: BTreeMap<Option<String>, Vec<String>>,
}

/// Current application state, computed from the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub goals: BTreeMap<String, Goal>,
    pub groupings: BTreeMap<String, Grouping>,
    pub reflections: BTreeMap<String, Reflection>,
    pub facets: BTreeMap<String, FacetLabel>,
    pub counters: Counters,
    /// Daily-window keys on which some activity was recorded
    pub activity_days: BTreeSet<NaiveDate>,
    pub diagnostics: Diagnostics,
    /// Unique events folded so far (including ones skipped with a diagnostic)
    pub events_folded: u64,
    /// Latest event folded, in derivation order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_folded: Option<EventMark>,
    /// Folded events that changed no entity (unknown types and skips), kept
    /// verbatim in derivation order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained_events: Vec<Event>,
    #[serde(skip)]
    pub indexes: Indexes,
}

impl DerivedState {
    pub fn new(counters: Counters) -> Self {
        Self {
            counters,
            ..Default::default()
        }
    }

    pub fn rebuild_indexes(&mut self) {
        let mut indexes = Indexes::default();
        for grouping in self.groupings.values() {
            indexes
                .groupings_by_parent
                .entry(grouping.parent_id.clone())
                .or_default()
                .push(grouping.id.clone());
        }
        for goal in self.goals.values() {
            indexes
                .goals_by_grouping
                .entry(goal.parent_id.clone())
                .or_default()
                .push(goal.id.clone());
        }
        self.indexes = indexes;
    }

    /// Client ids of every event folded into this state
    pub fn folded_ids(&self) -> HashSet<&str> {
        let mut ids = HashSet::new();
        for goal in self.goals.values() {
            ids.insert(goal.started.client_id.as_str());
            for mark in goal.concluded.iter().chain(goal.abandoned.iter()) {
                ids.insert(mark.client_id.as_str());
            }
            ids.extend(goal.nurtures.iter().map(|n| n.client_id.as_str()));
            ids.extend(goal.relabels.iter().map(|m| m.client_id.as_str()));
        }
        for grouping in self.groupings.values() {
            ids.insert(grouping.created.client_id.as_str());
            ids.extend(grouping.relabels.iter().map(|m| m.client_id.as_str()));
        }
        for facet in self.facets.values() {
            ids.extend(facet.relabels.iter().map(|m| m.client_id.as_str()));
        }
        ids.extend(self.reflections.keys().map(String::as_str));
        ids.extend(self.retained_events.iter().map(|e| e.client_id.as_str()));
        ids
    }

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.get(id)
    }

    /// Active goals, oldest first
    pub fn active_goals(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> = self.goals.values().filter(|g| g.is_active()).collect();
        goals.sort_by(|a, b| a.started.at.cmp(&b.started.at).then_with(|| a.id.cmp(&b.id)));
        goals
    }

    /// Concluded and abandoned goals, most recently closed first
    pub fn history(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> = self
            .goals
            .values()
            .filter(|g| g.state.is_terminal())
            .collect();
        goals.sort_by(|a, b| b.closed_at().cmp(&a.closed_at()).then_with(|| a.id.cmp(&b.id)));
        goals
    }

    /// Goals directly under a grouping (None = root)
    pub fn goals_in(&self, grouping: Option<&str>) -> Vec<&Goal> {
        self.indexes
            .goals_by_grouping
            .get(&grouping.map(str::to_string))
            .map(|ids| ids.iter().filter_map(|id| self.goals.get(id)).collect())
            .unwrap_or_default()
    }

    /// Child groupings of a grouping (None = root)
    pub fn child_groupings(&self, parent: Option<&str>) -> Vec<&Grouping> {
        self.indexes
            .groupings_by_parent
            .get(&parent.map(str::to_string))
            .map(|ids| ids.iter().filter_map(|id| self.groupings.get(id)).collect())
            .unwrap_or_default()
    }

    /// Reflections for one facet, oldest first
    pub fn reflections_for(&self, facet_id: &str) -> Vec<&Reflection> {
        let mut found: Vec<&Reflection> = self
            .reflections
            .values()
            .filter(|r| r.facet_id == facet_id)
            .collect();
        found.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Number of entities of each kind: (goals, groupings, reflections)
    pub fn entity_counts(&self) -> (usize, usize, usize) {
        (self.goals.len(), self.groupings.len(), self.reflections.len())
    }
}
