//! User actions
//!
//! Each action checks the current state, builds one event and appends it.
//! Usage caps are not enforced here; the window queries report them.

use tracing::info;
use uuid::Uuid;

use crate::derive::{abandon_refund, conclusion_rewards, suggested_cost};
use crate::types::{
    Difficulty, DurationClass, Event, EventPayload, Goal, GoalAbandonedData, GoalConcludedData,
    GoalNurturedData, GoalStartedData, GroupingCreatedData, NodeKind, NodeRef, NodeRelabeledData,
    ReflectionRecordedData, ResultTier,
};
use crate::utils::strictly_after;

use super::{Ledger, LedgerError, LedgerResult};

/// Input for [`Ledger::start_goal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGoal {
    pub title: String,
    pub duration_class: DurationClass,
    pub difficulty: Difficulty,
    pub parent_id: Option<String>,
    /// Defaults to the suggested cost for the duration and difficulty
    pub cost: Option<u32>,
}

impl NewGoal {
    pub fn new(title: impl Into<String>, duration_class: DurationClass, difficulty: Difficulty) -> Self {
        Self {
            title: title.into(),
            duration_class,
            difficulty,
            parent_id: None,
            cost: None,
        }
    }

    pub fn in_grouping(mut self, grouping_id: impl Into<String>) -> Self {
        self.parent_id = Some(grouping_id.into());
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = Some(cost);
        self
    }
}

impl Ledger {
    /// Start a goal and spend its cost; returns the new goal id
    pub fn start_goal(&mut self, goal: NewGoal) -> LedgerResult<String> {
        let title = non_empty(goal.title, "goal title")?;
        if let Some(parent) = &goal.parent_id {
            self.require_grouping(parent)?;
        }
        let cost = goal
            .cost
            .unwrap_or_else(|| suggested_cost(goal.duration_class, goal.difficulty));
        let available = self.state().counters.available;
        if cost > available {
            return Err(LedgerError::InsufficientBalance { cost, available });
        }

        let goal_id = Uuid::new_v4().to_string();
        self.record(EventPayload::GoalStarted(GoalStartedData {
            goal_id: goal_id.clone(),
            title,
            parent_id: goal.parent_id,
            duration_class: goal.duration_class,
            difficulty: goal.difficulty,
            cost,
        }))?;
        Ok(goal_id)
    }

    /// Add a journal entry to an active goal
    pub fn nurture_goal(&mut self, goal_id: &str, text: impl Into<String>) -> LedgerResult<Event> {
        self.require_active(goal_id)?;
        self.record(EventPayload::GoalNurtured(GoalNurturedData {
            goal_id: goal_id.to_string(),
            text: text.into(),
        }))
    }

    pub fn conclude_goal(&mut self, goal_id: &str, result: ResultTier) -> LedgerResult<Event> {
        let goal = self.require_active(goal_id)?;
        let rewards = conclusion_rewards(goal.cost, goal.duration_class, result);
        self.record(EventPayload::GoalConcluded(GoalConcludedData {
            goal_id: goal_id.to_string(),
            result,
            rewards,
        }))
    }

    /// Abandon an active goal; a quarter of its cost comes back
    pub fn abandon_goal(&mut self, goal_id: &str) -> LedgerResult<Event> {
        let goal = self.require_active(goal_id)?;
        self.record(EventPayload::GoalAbandoned(GoalAbandonedData {
            goal_id: goal_id.to_string(),
            refund: abandon_refund(goal.cost),
        }))
    }

    pub fn record_reflection(
        &mut self,
        facet_id: &str,
        text: impl Into<String>,
        cue_id: Option<String>,
    ) -> LedgerResult<Event> {
        let facet_id = non_empty(facet_id.to_string(), "facet id")?;
        self.record(EventPayload::ReflectionRecorded(ReflectionRecordedData {
            facet_id,
            text: text.into(),
            cue_id,
        }))
    }

    /// Create a grouping; returns its id
    pub fn create_grouping(&mut self, name: &str, parent_id: Option<&str>) -> LedgerResult<String> {
        let name = non_empty(name.to_string(), "grouping name")?;
        if let Some(parent) = parent_id {
            self.require_grouping(parent)?;
        }

        let grouping_id = Uuid::new_v4().to_string();
        self.record(EventPayload::GroupingCreated(GroupingCreatedData {
            grouping_id: grouping_id.clone(),
            name,
            parent_id: parent_id.map(str::to_string),
        }))?;
        Ok(grouping_id)
    }

    /// Change the label and/or note of a node
    ///
    /// An empty note clears it; an empty label is rejected.
    pub fn relabel_node(
        &mut self,
        node: NodeRef,
        label: Option<String>,
        note: Option<String>,
    ) -> LedgerResult<Event> {
        if label.is_none() && note.is_none() {
            return Err(LedgerError::InvalidInput("relabel needs a label or a note".to_string()));
        }
        let label = label.map(|l| non_empty(l, "label")).transpose()?;
        match node.kind {
            NodeKind::Goal => {
                if self.state().goal(&node.id).is_none() {
                    return Err(LedgerError::GoalNotFound(node.id));
                }
            }
            NodeKind::Grouping => self.require_grouping(&node.id)?,
            NodeKind::Facet => {
                if node.id.trim().is_empty() {
                    return Err(LedgerError::InvalidInput("facet id must not be empty".to_string()));
                }
            }
        }

        self.record(EventPayload::NodeRelabeled(NodeRelabeledData { node, label, note }))
    }

    fn record(&mut self, payload: EventPayload) -> LedgerResult<Event> {
        let last = self.log.latest_recorded_by(&self.config.device);
        let timestamp = strictly_after(last, self.clock.now());
        let event = Event::new(&payload, timestamp, Uuid::new_v4().to_string())
            .map_err(LedgerError::Encode)?
            .with_device(self.config.device.clone());

        self.log.append(event.clone())?;
        self.invalidate();
        info!(event_type = %event.event_type, client_id = %event.client_id, "recorded");
        Ok(event)
    }

    fn require_active(&self, goal_id: &str) -> LedgerResult<Goal> {
        let state = self.state();
        match state.goal(goal_id) {
            Some(goal) if goal.is_active() => Ok(goal.clone()),
            Some(_) => Err(LedgerError::GoalNotActive(goal_id.to_string())),
            None => Err(LedgerError::GoalNotFound(goal_id.to_string())),
        }
    }

    fn require_grouping(&self, grouping_id: &str) -> LedgerResult<()> {
        if self.state().groupings.contains_key(grouping_id) {
            Ok(())
        } else {
            Err(LedgerError::GroupingNotFound(grouping_id.to_string()))
        }
    }
}

fn non_empty(value: String, what: &str) -> LedgerResult<String> {
    if value.trim().is_empty() {
        Err(LedgerError::InvalidInput(format!("{what} must not be empty")))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::test_support::{day, reflect};
    use crate::types::{GoalState, NodeKind};
    use chrono::Duration;

    fn month_goal(ledger: &mut Ledger) -> String {
        // month × hard = 8
        ledger
            .start_goal(NewGoal::new("Write a novel", DurationClass::Month, Difficulty::Hard))
            .unwrap()
    }

    #[test]
    fn test_start_spends_cost() {
        let (mut ledger, _clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);

        let goal = ledger.goal(&goal_id).unwrap();
        assert_eq!(goal.cost, 8);
        assert_eq!(goal.state, GoalState::Active);
        assert_eq!(ledger.counters().available, 2);
        assert_eq!(ledger.log().pending_count(), 1);
    }

    #[test]
    fn test_conclude_returns_cost_and_grows_capacity() {
        let (mut ledger, clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);
        clock.advance(Duration::days(20));

        let event = ledger.conclude_goal(&goal_id, ResultTier::Exceeded).unwrap();

        let counters = ledger.counters();
        // month base 4, exceeded → +2 capacity; cost 8 back
        assert_eq!(counters.capacity, 12);
        assert_eq!(counters.available, 10);
        assert_eq!(counters.points, 24);
        assert_eq!(ledger.goal(&goal_id).unwrap().state, GoalState::Concluded);
        assert_eq!(event.device.as_deref(), Some("test-device"));
    }

    #[test]
    fn test_abandon_keeps_history() {
        let (mut ledger, clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);
        ledger.nurture_goal(&goal_id, "outline done").unwrap();
        clock.advance(Duration::days(1));

        ledger.abandon_goal(&goal_id).unwrap();

        let goal = ledger.goal(&goal_id).unwrap();
        assert_eq!(goal.state, GoalState::Abandoned);
        assert_eq!(goal.refund, Some(2));
        assert_eq!(goal.nurtures.len(), 1);
        assert_eq!(ledger.counters().available, 4);
        assert_eq!(ledger.history().len(), 1);
        assert!(ledger.active_goals().is_empty());
    }

    #[test]
    fn test_terminal_goals_reject_actions() {
        let (mut ledger, _clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);
        ledger.abandon_goal(&goal_id).unwrap();

        assert!(matches!(ledger.nurture_goal(&goal_id, "late"), Err(LedgerError::GoalNotActive(_))));
        assert!(matches!(ledger.conclude_goal(&goal_id, ResultTier::Achieved), Err(LedgerError::GoalNotActive(_))));
        assert!(matches!(ledger.abandon_goal("nope"), Err(LedgerError::GoalNotFound(_))));
    }

    #[test]
    fn test_insufficient_balance() {
        let (mut ledger, _clock, _dir) = ledger();
        month_goal(&mut ledger);

        let err = ledger
            .start_goal(NewGoal::new("Learn piano", DurationClass::Year, Difficulty::Easy))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { cost: 8, available: 2 }));
    }

    #[test]
    fn test_groupings_and_relabel() {
        let (mut ledger, _clock, _dir) = ledger();
        let health = ledger.create_grouping("Health", None).unwrap();
        let running = ledger.create_grouping("Running", Some(health.as_str())).unwrap();
        let goal_id = ledger
            .start_goal(
                NewGoal::new("5k", DurationClass::Week, Difficulty::Easy)
                    .in_grouping(running.clone())
                    .with_cost(1),
            )
            .unwrap();

        ledger
            .relabel_node(NodeRef::grouping(&running), Some("Jogging".to_string()), None)
            .unwrap();
        ledger
            .relabel_node(NodeRef::facet("mind"), None, Some("quiet weeks".to_string()))
            .unwrap();

        let state = ledger.state();
        assert_eq!(state.groupings[&running].name, "Jogging");
        assert_eq!(state.facets["mind"].note.as_deref(), Some("quiet weeks"));
        assert_eq!(ledger.goals_in(Some(running.as_str()))[0].id, goal_id);

        assert!(matches!(
            ledger.create_grouping("Orphan", Some("missing")),
            Err(LedgerError::GroupingNotFound(_))
        ));
        assert!(matches!(
            ledger.relabel_node(NodeRef::grouping(&health), Some("  ".to_string()), None),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.relabel_node(NodeRef { kind: NodeKind::Goal, id: "x".into() }, None, Some(String::new())),
            Err(LedgerError::GoalNotFound(_))
        ));
        assert!(matches!(
            ledger.relabel_node(NodeRef::goal(&goal_id), None, None),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let (mut ledger, _clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);
        // Clock does not move between actions
        let a = ledger.nurture_goal(&goal_id, "one").unwrap();
        let b = ledger.record_reflection("health", "fine", None).unwrap();

        assert!(a.timestamp < b.timestamp);
        assert!(matches!(ledger.record_reflection(" ", "x", None), Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn test_fast_remote_clock_does_not_shift_local_timestamps() {
        let (mut ledger, clock, _dir) = ledger();
        let goal_id = month_goal(&mut ledger);
        // Another device thinks it is already three days later
        let ahead = reflect("remote-1", "mind", day(3, 9)).with_device("laptop");
        ledger.apply_incremental(vec![ahead], 1).unwrap();

        let nurtured = ledger.nurture_goal(&goal_id, "page one").unwrap();
        assert!(nurtured.timestamp < day(0, 10));

        clock.advance(Duration::days(1));
        let gate = ledger.nurture_gate(&goal_id);
        assert_eq!(gate.used, 0);
        assert!(!gate.is_exhausted());
    }
}
