//! Migration from the legacy flat-state format
//!
//! Before the event log existed, state was saved as one JSON document of
//! current values. Migration turns each dated fact in that document into an
//! event carrying the original date:
//!
//! 1. Parse and version-check the legacy document
//! 2. Emit one event per fact (creation, journal entry, completion, ...)
//! 3. Derive state from those events
//! 4. Compare the result with the document and refuse on any entity mismatch
//!
//! Client ids are derived from the legacy ids (`legacy:<kind>:<id>[:n]`), so
//! migrating the same document twice produces the same events and the log
//! dedups the second run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::derive::{abandon_refund, conclusion_rewards, derive_state, suggested_cost};
use crate::types::{
    Counters, DerivedState, Difficulty, DurationClass, Event, EventPayload, EventSource,
    GoalAbandonedData, GoalConcludedData, GoalNurturedData, GoalStartedData, GoalState,
    GroupingCreatedData, ReflectionRecordedData, ResultTier,
};

/// Legacy format versions this build can read
pub const LEGACY_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("legacy document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("legacy version {0:?} is not supported")]
    UnsupportedVersion(Option<u64>),
    #[error("goal {0} is {1} but has no completion date")]
    MissingDate(String, &'static str),
    #[error("migrated state does not match the legacy document: {}", .0.join("; "))]
    Mismatch(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyState {
    pub version: u32,
    pub capacity: u32,
    pub available: u32,
    #[serde(default)]
    pub groupings: Vec<LegacyGrouping>,
    #[serde(default)]
    pub goals: Vec<LegacyGoal>,
    #[serde(default)]
    pub reflections: Vec<LegacyReflection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyGrouping {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyGoal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub duration_class: DurationClass,
    pub difficulty: Difficulty,
    /// Older documents did not store the cost; it is recomputed
    #[serde(default)]
    pub cost: Option<u32>,
    pub status: LegacyStatus,
    #[serde(default)]
    pub result: Option<ResultTier>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub journal: Vec<LegacyJournalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyJournalEntry {
    pub date: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyReflection {
    pub facet_id: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Counters that disagree between the document and the replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub legacy_capacity: u32,
    pub legacy_available: u32,
    pub derived: Counters,
}

/// What a verified migration produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub events_created: usize,
    pub goals: usize,
    pub groupings: usize,
    pub reflections: usize,
    pub nurtures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_drift: Option<CounterDrift>,
}

/// Synthesized events together with the check that they reproduce the document
#[derive(Debug, Clone)]
pub struct Migration {
    pub events: Vec<Event>,
    pub state: DerivedState,
    pub report: MigrationReport,
}

pub fn parse_legacy(raw: &str) -> Result<LegacyState, MigrationError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let version = value.get("version").and_then(serde_json::Value::as_u64);
    if version != Some(u64::from(LEGACY_VERSION)) {
        return Err(MigrationError::UnsupportedVersion(version));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn read_legacy<P: AsRef<Path>>(path: P) -> Result<LegacyState, MigrationError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| MigrationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_legacy(&raw)
}

/// One event per dated fact, in derivation order
pub fn synthesize_events(legacy: &LegacyState) -> Result<Vec<Event>, MigrationError> {
    let mut events = Vec::new();
    let mut push = |payload: EventPayload, at: DateTime<Utc>, client_id: String| -> Result<(), MigrationError> {
        events.push(Event::new(&payload, at, client_id)?.with_source(EventSource::Migration));
        Ok(())
    };

    for grouping in &legacy.groupings {
        push(
            EventPayload::GroupingCreated(GroupingCreatedData {
                grouping_id: grouping.id.clone(),
                name: grouping.name.clone(),
                parent_id: grouping.parent_id.clone(),
            }),
            grouping.created_at,
            format!("legacy:grouping:{}", grouping.id),
        )?;
    }

    for goal in &legacy.goals {
        let cost = goal
            .cost
            .unwrap_or_else(|| suggested_cost(goal.duration_class, goal.difficulty));
        push(
            EventPayload::GoalStarted(GoalStartedData {
                goal_id: goal.id.clone(),
                title: goal.title.clone(),
                parent_id: goal.parent_id.clone(),
                duration_class: goal.duration_class,
                difficulty: goal.difficulty,
                cost,
            }),
            goal.created_at,
            format!("legacy:goal:{}", goal.id),
        )?;

        for (n, entry) in goal.journal.iter().enumerate() {
            push(
                EventPayload::GoalNurtured(GoalNurturedData {
                    goal_id: goal.id.clone(),
                    text: entry.text.clone(),
                }),
                entry.date,
                format!("legacy:nurture:{}:{n}", goal.id),
            )?;
        }

        match goal.status {
            LegacyStatus::Active => {}
            LegacyStatus::Completed => {
                let at = goal
                    .completed_at
                    .ok_or_else(|| MigrationError::MissingDate(goal.id.clone(), "completed"))?;
                let result = goal.result.unwrap_or(ResultTier::Achieved);
                push(
                    EventPayload::GoalConcluded(GoalConcludedData {
                        goal_id: goal.id.clone(),
                        result,
                        rewards: conclusion_rewards(cost, goal.duration_class, result),
                    }),
                    at,
                    format!("legacy:conclude:{}", goal.id),
                )?;
            }
            LegacyStatus::Abandoned => {
                let at = goal
                    .completed_at
                    .ok_or_else(|| MigrationError::MissingDate(goal.id.clone(), "abandoned"))?;
                push(
                    EventPayload::GoalAbandoned(GoalAbandonedData {
                        goal_id: goal.id.clone(),
                        refund: abandon_refund(cost),
                    }),
                    at,
                    format!("legacy:abandon:{}", goal.id),
                )?;
            }
        }
    }

    for (n, reflection) in legacy.reflections.iter().enumerate() {
        push(
            EventPayload::ReflectionRecorded(ReflectionRecordedData {
                facet_id: reflection.facet_id.clone(),
                text: reflection.text.clone(),
                cue_id: None,
            }),
            reflection.date,
            format!("legacy:reflection:{n}"),
        )?;
    }

    events.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    Ok(events)
}

/// Compare a derived state with the document it came from
///
/// Entity differences are an error. Counter differences are reported in
/// the result: the legacy app adjusted counters in place, so small drift is
/// expected and not worth refusing the migration over.
pub fn verify(legacy: &LegacyState, state: &DerivedState) -> Result<MigrationReport, MigrationError> {
    let mut problems = Vec::new();

    let (goals, groupings, reflections) = state.entity_counts();
    for (kind, expected, found) in [
        ("goals", legacy.goals.len(), goals),
        ("groupings", legacy.groupings.len(), groupings),
        ("reflections", legacy.reflections.len(), reflections),
    ] {
        if expected != found {
            problems.push(format!("expected {expected} {kind}, derived {found}"));
        }
    }

    for legacy_goal in &legacy.goals {
        let Some(goal) = state.goal(&legacy_goal.id) else {
            problems.push(format!("goal {} is missing", legacy_goal.id));
            continue;
        };
        let expected_state = match legacy_goal.status {
            LegacyStatus::Active => GoalState::Active,
            LegacyStatus::Completed => GoalState::Concluded,
            LegacyStatus::Abandoned => GoalState::Abandoned,
        };
        if goal.state != expected_state {
            problems.push(format!("goal {} is {:?}, expected {:?}", goal.id, goal.state, expected_state));
        }
        if goal.title != legacy_goal.title {
            problems.push(format!("goal {} title differs", goal.id));
        }
        if goal.nurtures.len() != legacy_goal.journal.len() {
            problems.push(format!(
                "goal {} has {} journal entries, expected {}",
                goal.id,
                goal.nurtures.len(),
                legacy_goal.journal.len()
            ));
        }
    }

    if !problems.is_empty() {
        return Err(MigrationError::Mismatch(problems));
    }

    let counters = state.counters;
    let counter_drift = (counters.capacity != legacy.capacity || counters.available != legacy.available)
        .then(|| CounterDrift {
            legacy_capacity: legacy.capacity,
            legacy_available: legacy.available,
            derived: counters,
        });
    if let Some(drift) = &counter_drift {
        warn!(?drift, "migrated counters differ from the legacy document");
    }

    Ok(MigrationReport {
        events_created: 0,
        goals,
        groupings,
        reflections,
        nurtures: state.goals.values().map(|g| g.nurtures.len()).sum(),
        counter_drift,
    })
}

/// Synthesize, derive and verify in one step
pub fn migrate(legacy: &LegacyState) -> Result<Migration, MigrationError> {
    let events = synthesize_events(legacy)?;
    let state = derive_state(&events, None);
    let mut report = verify(legacy, &state)?;
    report.events_created = events.len();

    info!(
        events = report.events_created,
        goals = report.goals,
        groupings = report.groupings,
        reflections = report.reflections,
        "legacy state migrated"
    );
    Ok(Migration { events, state, report })
}
