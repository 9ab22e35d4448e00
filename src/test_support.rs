//! Event builders shared by unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use crate::types::{
    Difficulty, DurationClass, Event, EventPayload, EventType, GoalAbandonedData, GoalConcludedData,
    GoalNurturedData, GoalStartedData, GroupingCreatedData, NodeRef, NodeRelabeledData,
    ReflectionRecordedData, ResultTier, Rewards,
};

/// Monday 2024-01-01 00:00 UTC plus an offset in minutes
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn day(days: i64, hour: i64) -> DateTime<Utc> {
    at(days * 24 * 60 + hour * 60)
}

fn event(payload: EventPayload, ts: DateTime<Utc>, id: &str) -> Event {
    Event::new(&payload, ts, id).unwrap()
}

pub fn start(id: &str, goal: &str, cost: u32, ts: DateTime<Utc>) -> Event {
    start_in(id, goal, None, cost, ts)
}

pub fn start_in(id: &str, goal: &str, parent: Option<&str>, cost: u32, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::GoalStarted(GoalStartedData {
            goal_id: goal.to_string(),
            title: format!("title of {goal}"),
            parent_id: parent.map(str::to_string),
            duration_class: DurationClass::Month,
            difficulty: Difficulty::Hard,
            cost,
        }),
        ts,
        id,
    )
}

pub fn nurture(id: &str, goal: &str, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::GoalNurtured(GoalNurturedData {
            goal_id: goal.to_string(),
            text: format!("entry {id}"),
        }),
        ts,
        id,
    )
}

pub fn conclude(id: &str, goal: &str, capacity: u32, points: u32, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::GoalConcluded(GoalConcludedData {
            goal_id: goal.to_string(),
            result: ResultTier::Exceeded,
            rewards: Rewards { capacity, points },
        }),
        ts,
        id,
    )
}

pub fn abandon(id: &str, goal: &str, refund: u32, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::GoalAbandoned(GoalAbandonedData {
            goal_id: goal.to_string(),
            refund,
        }),
        ts,
        id,
    )
}

pub fn reflect(id: &str, facet: &str, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::ReflectionRecorded(ReflectionRecordedData {
            facet_id: facet.to_string(),
            text: format!("thought {id}"),
            cue_id: None,
        }),
        ts,
        id,
    )
}

pub fn grouping(id: &str, grouping_id: &str, parent: Option<&str>, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::GroupingCreated(GroupingCreatedData {
            grouping_id: grouping_id.to_string(),
            name: format!("name of {grouping_id}"),
            parent_id: parent.map(str::to_string),
        }),
        ts,
        id,
    )
}

pub fn relabel(id: &str, node: NodeRef, label: &str, ts: DateTime<Utc>) -> Event {
    event(
        EventPayload::NodeRelabeled(NodeRelabeledData {
            node,
            label: Some(label.to_string()),
            note: None,
        }),
        ts,
        id,
    )
}

/// An event of a type this build does not know
pub fn unknown(id: &str, event_type: &str, ts: DateTime<Utc>) -> Event {
    let mut event = reflect(id, "facet", ts);
    event.event_type = EventType::Other(event_type.to_string());
    event.data = json!({ "habitId": "h1", "count": 3 });
    event
}

/// A goal start missing its required fields
pub fn malformed(id: &str, goal: &str, ts: DateTime<Utc>) -> Event {
    let mut event = start(id, goal, 1, ts);
    event.data = json!({ "goalId": goal });
    event
}

/// Random logs over a small pool of goals and groupings
///
/// Client ids are unique; references may dangle, starts may overdraw, and
/// some events are malformed or of unknown type, so generated logs exercise
/// the diagnostic paths too.
pub fn arb_log(max_len: usize) -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec((0u8..10, 0u8..4, 0i64..(14 * 24 * 60), 1u32..5), 0..max_len).prop_map(
        |ops| {
            ops.into_iter()
                .enumerate()
                .map(|(i, (kind, target, minute, amount))| {
                    let id = format!("ev-{i:04}");
                    let goal = format!("goal-{target}");
                    let ts = at(minute);
                    match kind {
                        0 | 1 => start_in(
                            &id,
                            &goal,
                            (target % 2 == 0).then_some("grp-0"),
                            amount * 2,
                            ts,
                        ),
                        2 => nurture(&id, &goal, ts),
                        3 => conclude(&id, &goal, amount % 3, amount * 4, ts),
                        4 => abandon(&id, &goal, amount / 2, ts),
                        5 => reflect(&id, &format!("facet-{target}"), ts),
                        6 => grouping(&id, &format!("grp-{target}"), None, ts),
                        7 => relabel(&id, NodeRef::goal(goal), &format!("renamed {i}"), ts),
                        8 => unknown(&id, "habit_tracked", ts),
                        _ => malformed(&id, &goal, ts),
                    }
                })
                .collect()
        },
    )
}
