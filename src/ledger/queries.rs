//! Read accessors for the UI
//!
//! Entity queries read the cached derived state. Window queries count raw
//! log events (the uncompacted tail always covers the current week) and
//! are cached until the log changes or the window rolls over.

use crate::cues::RecentlyShown;
use crate::event_store::{LedgerStats, StatsCollector, SyncState};
use crate::types::{Counters, Diagnostics, Goal, Grouping, Reflection};
use crate::windows::{self, Allowance, WindowKind};

use super::Ledger;

const REFLECTIONS_KEY: &str = "reflections";

impl Ledger {
    pub fn goal(&self, goal_id: &str) -> Option<Goal> {
        self.state().goal(goal_id).cloned()
    }

    pub fn active_goals(&self) -> Vec<Goal> {
        self.state().active_goals().into_iter().cloned().collect()
    }

    /// Concluded and abandoned goals, most recently closed first
    pub fn history(&self) -> Vec<Goal> {
        self.state().history().into_iter().cloned().collect()
    }

    pub fn goals_in(&self, grouping_id: Option<&str>) -> Vec<Goal> {
        self.state().goals_in(grouping_id).into_iter().cloned().collect()
    }

    pub fn child_groupings(&self, parent_id: Option<&str>) -> Vec<Grouping> {
        self.state()
            .child_groupings(parent_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn reflections_for(&self, facet_id: &str) -> Vec<Reflection> {
        self.state()
            .reflections_for(facet_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn counters(&self) -> Counters {
        self.state().counters
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.state().diagnostics.clone()
    }

    /// Today's nurture allowance for one goal
    ///
    /// `is_exhausted()` on the result is the "already done today" signal.
    pub fn nurture_gate(&self, goal_id: &str) -> Allowance {
        let key = format!("nurture:{goal_id}");
        self.cached_allowance(&key, WindowKind::Daily, |ledger, now| {
            windows::nurture_allowance(ledger.log.events(), goal_id, &ledger.config.caps, now)
        })
    }

    /// This week's reflection allowance
    pub fn reflection_allowance(&self) -> Allowance {
        self.cached_allowance(REFLECTIONS_KEY, WindowKind::Weekly, |ledger, now| {
            windows::reflection_allowance(ledger.log.events(), &ledger.config.caps, now)
        })
    }

    /// Consecutive days with recorded activity
    pub fn streak(&self) -> u32 {
        windows::streak(&self.state().activity_days, self.clock.now())
    }

    pub fn stats(&self) -> LedgerStats {
        StatsCollector::new(&self.log, self.snapshot.as_ref()).collect()
    }

    pub fn sync_state(&self) -> SyncState {
        self.log.sync_state().clone()
    }

    /// Pick a reflection cue, avoiding the ones shown recently
    pub fn pick_reflection_cue(&mut self, candidates: &[String]) -> Option<String> {
        self.cues.pick(candidates).map(str::to_string)
    }

    pub fn recent_cues(&self) -> &RecentlyShown {
        &self.cues
    }

    fn cached_allowance(
        &self,
        key: &str,
        kind: WindowKind,
        compute: impl FnOnce(&Self, chrono::DateTime<chrono::Utc>) -> Allowance,
    ) -> Allowance {
        let now = self.clock.now();
        let count = self.log.len();
        if let Some(hit) = self.allowances.borrow().get(key, count, now) {
            return hit;
        }
        let allowance = compute(self, now);
        self.allowances
            .borrow_mut()
            .insert(key, allowance, kind, count, now);
        allowance
    }
}
