//! Per-type reducer
//!
//! Each handler either applies its event or returns a `Skip` describing why
//! it could not. Skips are counted and logged; they never stop the fold.

use tracing::{debug, warn};

use crate::types::{
    DerivedState, Event, EventMark, EventPayload, FacetLabel, Goal, GoalAbandonedData,
    GoalConcludedData, GoalNurturedData, GoalStartedData, GoalState, Grouping,
    GroupingCreatedData, NodeKind, NodeRelabeledData, NurtureEntry, Reflection,
    ReflectionRecordedData,
};
use crate::windows::day_key;

enum Skip {
    Structural(String),
    Reference(String),
}

type Step = Result<(), Skip>;

/// Fold one event into the state
pub(crate) fn apply(state: &mut DerivedState, event: &Event) {
    state.events_folded += 1;
    let mark = EventMark::new(event.client_id.clone(), event.timestamp);
    let advances = state
        .last_folded
        .as_ref()
        .map_or(true, |last| (last.at, last.client_id.as_str()) < event.order_key());
    if advances {
        state.last_folded = Some(mark.clone());
    }

    let payload = match event.payload() {
        Ok(payload) => payload,
        Err(e) => {
            record_skip(state, event, Skip::Structural(e.to_string()));
            return;
        }
    };

    let step = match payload {
        EventPayload::GoalStarted(data) => goal_started(state, data, mark),
        EventPayload::GoalNurtured(data) => goal_nurtured(state, data, mark),
        EventPayload::GoalConcluded(data) => goal_concluded(state, data, mark),
        EventPayload::GoalAbandoned(data) => goal_abandoned(state, data, mark),
        EventPayload::ReflectionRecorded(data) => reflection_recorded(state, data, mark),
        EventPayload::GroupingCreated(data) => grouping_created(state, data, mark),
        EventPayload::NodeRelabeled(data) => node_relabeled(state, data, mark),
        EventPayload::Unknown(name) => {
            state.diagnostics.unknown += 1;
            state.retained_events.push(event.clone());
            debug!(event_type = %name, client_id = %event.client_id, "ignoring unknown event type");
            Ok(())
        }
    };

    if let Err(skip) = step {
        record_skip(state, event, skip);
    }
}

fn record_skip(state: &mut DerivedState, event: &Event, skip: Skip) {
    state.retained_events.push(event.clone());
    match skip {
        Skip::Structural(reason) => {
            state.diagnostics.structural += 1;
            warn!(client_id = %event.client_id, event_type = %event.event_type, %reason, "skipping malformed event");
        }
        Skip::Reference(reason) => {
            state.diagnostics.reference += 1;
            warn!(client_id = %event.client_id, event_type = %event.event_type, %reason, "skipping event with dangling reference");
        }
    }
}

fn active_goal<'a>(
    goals: &'a mut std::collections::BTreeMap<String, Goal>,
    goal_id: &str,
) -> Result<&'a mut Goal, Skip> {
    let goal = goals
        .get_mut(goal_id)
        .ok_or_else(|| Skip::Reference(format!("goal {goal_id} does not exist")))?;
    if goal.state.is_terminal() {
        return Err(Skip::Reference(format!(
            "goal {goal_id} is already {:?}",
            goal.state
        )));
    }
    Ok(goal)
}

fn goal_started(state: &mut DerivedState, data: GoalStartedData, mark: EventMark) -> Step {
    if data.goal_id.is_empty() || data.title.trim().is_empty() {
        return Err(Skip::Structural("goal_started needs a goalId and a title".to_string()));
    }
    if state.goals.contains_key(&data.goal_id) {
        return Err(Skip::Structural(format!("goal {} was already started", data.goal_id)));
    }
    if let Some(parent) = &data.parent_id {
        if !state.groupings.contains_key(parent) {
            return Err(Skip::Reference(format!("grouping {parent} does not exist")));
        }
    }

    if data.cost > state.counters.available {
        // The write path refuses this, so reaching it means the log order or
        // the rules are wrong. Keep the goal, floor the balance, and count it.
        let shortfall = data.cost - state.counters.available;
        state.diagnostics.capacity += 1;
        state.diagnostics.capacity_shortfall += u64::from(shortfall);
        warn!(
            goal_id = %data.goal_id,
            cost = data.cost,
            available = state.counters.available,
            "goal start exceeds available balance"
        );
        state.counters.available = 0;
    } else {
        state.counters.available -= data.cost;
    }

    state.activity_days.insert(day_key(mark.at));
    state.goals.insert(
        data.goal_id.clone(),
        Goal {
            id: data.goal_id,
            parent_id: data.parent_id,
            title: data.title,
            note: None,
            duration_class: data.duration_class,
            difficulty: data.difficulty,
            cost: data.cost,
            state: GoalState::Active,
            started: mark,
            concluded: None,
            abandoned: None,
            nurtures: Vec::new(),
            result: None,
            rewards: None,
            refund: None,
            relabels: Vec::new(),
        },
    );
    Ok(())
}

fn goal_nurtured(state: &mut DerivedState, data: GoalNurturedData, mark: EventMark) -> Step {
    // No cap check here: two devices may both nurture within one window and
    // both entries are kept. The window gate is a read-time concern.
    let goal = active_goal(&mut state.goals, &data.goal_id)?;
    state.activity_days.insert(day_key(mark.at));
    goal.nurtures.push(NurtureEntry {
        client_id: mark.client_id,
        at: mark.at,
        text: data.text,
    });
    Ok(())
}

fn goal_concluded(state: &mut DerivedState, data: GoalConcludedData, mark: EventMark) -> Step {
    let goal = active_goal(&mut state.goals, &data.goal_id)?;
    let cost = goal.cost;
    state.activity_days.insert(day_key(mark.at));
    goal.state = GoalState::Concluded;
    goal.concluded = Some(mark);
    goal.result = Some(data.result);
    goal.rewards = Some(data.rewards);

    let counters = &mut state.counters;
    counters.capacity = counters.capacity.saturating_add(data.rewards.capacity);
    counters.available = counters.available.saturating_add(cost).min(counters.capacity);
    counters.points += u64::from(data.rewards.points);
    Ok(())
}

fn goal_abandoned(state: &mut DerivedState, data: GoalAbandonedData, mark: EventMark) -> Step {
    let goal = active_goal(&mut state.goals, &data.goal_id)?;
    if data.refund > goal.cost {
        return Err(Skip::Structural(format!(
            "refund {} exceeds cost {} of goal {}",
            data.refund, goal.cost, data.goal_id
        )));
    }
    goal.state = GoalState::Abandoned;
    goal.abandoned = Some(mark);
    goal.refund = Some(data.refund);

    let counters = &mut state.counters;
    counters.available = counters.available.saturating_add(data.refund).min(counters.capacity);
    Ok(())
}

fn reflection_recorded(
    state: &mut DerivedState,
    data: ReflectionRecordedData,
    mark: EventMark,
) -> Step {
    if data.facet_id.is_empty() {
        return Err(Skip::Structural("reflection_recorded needs a facetId".to_string()));
    }
    state.activity_days.insert(day_key(mark.at));
    state.reflections.insert(
        mark.client_id.clone(),
        Reflection {
            id: mark.client_id,
            facet_id: data.facet_id,
            text: data.text,
            cue_id: data.cue_id,
            recorded_at: mark.at,
        },
    );
    Ok(())
}

fn grouping_created(state: &mut DerivedState, data: GroupingCreatedData, mark: EventMark) -> Step {
    if data.grouping_id.is_empty() || data.name.trim().is_empty() {
        return Err(Skip::Structural(
            "grouping_created needs a groupingId and a name".to_string(),
        ));
    }
    if state.groupings.contains_key(&data.grouping_id) {
        return Err(Skip::Structural(format!(
            "grouping {} already exists",
            data.grouping_id
        )));
    }
    if let Some(parent) = &data.parent_id {
        if !state.groupings.contains_key(parent) {
            return Err(Skip::Reference(format!("grouping {parent} does not exist")));
        }
    }
    state.groupings.insert(
        data.grouping_id.clone(),
        Grouping {
            id: data.grouping_id,
            name: data.name,
            parent_id: data.parent_id,
            note: None,
            created: mark,
            relabels: Vec::new(),
        },
    );
    Ok(())
}

fn node_relabeled(state: &mut DerivedState, data: NodeRelabeledData, mark: EventMark) -> Step {
    if data.label.is_none() && data.note.is_none() {
        return Err(Skip::Structural("node_relabeled carries neither label nor note".to_string()));
    }
    if data.label.as_deref().is_some_and(|l| l.trim().is_empty()) {
        return Err(Skip::Structural("node_relabeled label is empty".to_string()));
    }
    if data.node.id.is_empty() {
        return Err(Skip::Structural("node_relabeled needs a node id".to_string()));
    }
    let note = data.note.map(|n| if n.is_empty() { None } else { Some(n) });

    match data.node.kind {
        NodeKind::Goal => {
            let goal = state
                .goals
                .get_mut(&data.node.id)
                .ok_or_else(|| Skip::Reference(format!("goal {} does not exist", data.node.id)))?;
            if let Some(label) = data.label {
                goal.title = label;
            }
            if let Some(note) = note {
                goal.note = note;
            }
            goal.relabels.push(mark);
        }
        NodeKind::Grouping => {
            let grouping = state.groupings.get_mut(&data.node.id).ok_or_else(|| {
                Skip::Reference(format!("grouping {} does not exist", data.node.id))
            })?;
            if let Some(label) = data.label {
                grouping.name = label;
            }
            if let Some(note) = note {
                grouping.note = note;
            }
            grouping.relabels.push(mark);
        }
        NodeKind::Facet => {
            let facet = state
                .facets
                .entry(data.node.id.clone())
                .or_insert_with(|| FacetLabel {
                    id: data.node.id.clone(),
                    label: None,
                    note: None,
                    relabels: Vec::new(),
                });
            if let Some(label) = data.label {
                facet.label = Some(label);
            }
            if let Some(note) = note {
                facet.note = note;
            }
            facet.relabels.push(mark);
        }
    }
    Ok(())
}
