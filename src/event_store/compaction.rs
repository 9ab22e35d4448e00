//! Compaction Manager
//!
//! Folds old, confirmed events into a [`Snapshot`] and keeps a short tail of
//! raw events after the cutoff. Window queries only ever look at the current
//! week, so the tail window is chosen to cover it with room to spare.
//!
//! # Cutoff
//!
//! ```text
//! cutoff = daily reset at `now` - tail window - safety margin
//!
//! ──────────────────────────┬──────────────────────┬──────────▶ time
//!   folded into snapshot    │ cutoff    tail (raw events)    now
//! ```
//!
//! A pending (unacknowledged) event at or before that instant pulls the
//! cutoff back to just before it. Unconfirmed events are never compacted.
//!
//! [`decompact`] goes the other way and rebuilds a flat event list from a
//! snapshot, which is what keeps exports complete after compaction.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::derive::derive_state;
use crate::types::{
    Event, EventMark, EventPayload, EventSource, GoalAbandonedData, GoalConcludedData,
    GoalNurturedData, GoalStartedData, GroupingCreatedData, NodeRef, NodeRelabeledData,
    ReflectionRecordedData, Snapshot,
};
use crate::windows::{reset_boundary, WindowKind};

/// When and how much to compact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Local event count that triggers compaction
    pub threshold: usize,
    /// Raw events kept after the cutoff
    pub tail_window: Duration,
    pub safety_margin: Duration,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            threshold: 500,
            tail_window: Duration::days(7),
            safety_margin: Duration::days(1),
        }
    }
}

impl CompactionPolicy {
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn should_compact(&self, log_len: usize) -> bool {
        log_len >= self.threshold
    }

    /// Latest safe cutoff at `now`
    pub fn cutoff(&self, now: DateTime<Utc>, earliest_pending: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let cutoff = reset_boundary(WindowKind::Daily, now) - self.tail_window - self.safety_margin;
        match earliest_pending {
            Some(pending) if pending <= cutoff => pending - Duration::microseconds(1),
            _ => cutoff,
        }
    }
}

/// Result of a compaction pass, not yet persisted
#[derive(Debug, Clone)]
pub struct Compaction {
    pub snapshot: Snapshot,
    /// Events after the cutoff; the log is rewritten to exactly these
    pub tail: Vec<Event>,
    /// Log entries folded by this pass
    pub compacted: usize,
}

/// Fold every event at or before `cutoff` on top of `previous`
///
/// Returns `None` when there is nothing to fold or `cutoff` does not move
/// past the previous snapshot.
pub fn compact(
    events: &[Event],
    previous: Option<&Snapshot>,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<Compaction> {
    if previous.is_some_and(|p| cutoff <= p.cutoff) {
        debug!(%cutoff, "cutoff does not advance past previous snapshot");
        return None;
    }

    let (folded, tail): (Vec<Event>, Vec<Event>) =
        events.iter().cloned().partition(|e| e.timestamp <= cutoff);
    if folded.is_empty() {
        return None;
    }

    let state = derive_state(&folded, previous);
    let compacted_event_count =
        previous.map_or(0, |p| p.compacted_event_count) + folded.len() as u64;
    let snapshot = Snapshot::capture(&state, cutoff, compacted_event_count, now)?;

    Some(Compaction {
        snapshot,
        tail,
        compacted: folded.len(),
    })
}

/// Rebuild a flat event list from a snapshot
///
/// Every fact recorded on an entity becomes one event with its original
/// client id and timestamp. Labels are emitted as they are now, so deriving
/// the result reproduces the snapshot's entities, counters and activity days.
/// Retained events (unknown types and skips) come back verbatim, so every
/// folded client id survives.
pub fn decompact(snapshot: &Snapshot) -> Result<Vec<Event>, serde_json::Error> {
    let mut events = Vec::new();
    let mut push = |payload: EventPayload, mark: &EventMark| -> Result<(), serde_json::Error> {
        let event = Event::new(&payload, mark.at, mark.client_id.clone())?.with_source(EventSource::Snapshot);
        events.push(event);
        Ok(())
    };

    for grouping in snapshot.groupings.values() {
        push(
            EventPayload::GroupingCreated(GroupingCreatedData {
                grouping_id: grouping.id.clone(),
                name: grouping.name.clone(),
                parent_id: grouping.parent_id.clone(),
            }),
            &grouping.created,
        )?;
        for mark in &grouping.relabels {
            push(
                relabel_payload(NodeRef::grouping(&grouping.id), Some(&grouping.name), grouping.note.as_deref()),
                mark,
            )?;
        }
    }

    for goal in snapshot.goals.values() {
        push(
            EventPayload::GoalStarted(GoalStartedData {
                goal_id: goal.id.clone(),
                title: goal.title.clone(),
                parent_id: goal.parent_id.clone(),
                duration_class: goal.duration_class,
                difficulty: goal.difficulty,
                cost: goal.cost,
            }),
            &goal.started,
        )?;
        for entry in &goal.nurtures {
            push(
                EventPayload::GoalNurtured(GoalNurturedData {
                    goal_id: goal.id.clone(),
                    text: entry.text.clone(),
                }),
                &EventMark::new(entry.client_id.clone(), entry.at),
            )?;
        }
        if let (Some(mark), Some(result)) = (&goal.concluded, goal.result) {
            push(
                EventPayload::GoalConcluded(GoalConcludedData {
                    goal_id: goal.id.clone(),
                    result,
                    rewards: goal.rewards.unwrap_or_default(),
                }),
                mark,
            )?;
        }
        if let Some(mark) = &goal.abandoned {
            push(
                EventPayload::GoalAbandoned(GoalAbandonedData {
                    goal_id: goal.id.clone(),
                    refund: goal.refund.unwrap_or(0),
                }),
                mark,
            )?;
        }
        for mark in &goal.relabels {
            push(relabel_payload(NodeRef::goal(&goal.id), Some(&goal.title), goal.note.as_deref()), mark)?;
        }
    }

    for facet in snapshot.facets.values() {
        for mark in &facet.relabels {
            push(
                relabel_payload(NodeRef::facet(&facet.id), facet.label.as_deref(), facet.note.as_deref()),
                mark,
            )?;
        }
    }

    for reflection in snapshot.reflections.values() {
        push(
            EventPayload::ReflectionRecorded(ReflectionRecordedData {
                facet_id: reflection.facet_id.clone(),
                text: reflection.text.clone(),
                cue_id: reflection.cue_id.clone(),
            }),
            &EventMark::new(reflection.id.clone(), reflection.recorded_at),
        )?;
    }

    events.extend(snapshot.retained_events.iter().cloned());
    events.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    Ok(events)
}

// An empty note clears it, so the current "no note" survives replay
fn relabel_payload(node: NodeRef, label: Option<&str>, note: Option<&str>) -> EventPayload {
    EventPayload::NodeRelabeled(NodeRelabeledData {
        node,
        label: label.map(str::to_string),
        note: Some(note.unwrap_or_default().to_string()),
    })
}
