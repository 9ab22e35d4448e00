//! Goal entity and its classification enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::EventMark;

/// How long a goal is meant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    Day,
    Week,
    Month,
    Season,
    Year,
}

impl DurationClass {
    /// Base cost before the difficulty multiplier
    pub fn base_cost(self) -> u32 {
        match self {
            DurationClass::Day => 1,
            DurationClass::Week => 2,
            DurationClass::Month => 4,
            DurationClass::Season => 6,
            DurationClass::Year => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

impl Difficulty {
    pub fn multiplier(self) -> u32 {
        match self {
            Difficulty::Easy | Difficulty::Moderate => 1,
            Difficulty::Hard => 2,
        }
    }
}

/// Outcome recorded when a goal is concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTier {
    Partial,
    Achieved,
    /// Top tier
    Exceeded,
}

/// Lifecycle state. Anything but `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Active,
    Concluded,
    Abandoned,
}

impl GoalState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GoalState::Active)
    }
}

/// Rewards granted at conclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rewards {
    /// Added to capacity
    pub capacity: u32,
    /// Added to the lifetime points counter
    pub points: u32,
}

/// One journal entry on a goal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NurtureEntry {
    pub client_id: String,
    pub at: DateTime<Utc>,
    pub text: String,
}

/// A personal goal
///
/// Concluded and abandoned goals stay in the map with their full history.
/// The reward/refund fields are kept explicitly so that a snapshot can be
/// turned back into events without losing what the counters absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub duration_class: DurationClass,
    pub difficulty: Difficulty,
    pub cost: u32,
    pub state: GoalState,
    pub started: EventMark,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concluded: Option<EventMark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned: Option<EventMark>,
    #[serde(default)]
    pub nurtures: Vec<NurtureEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Rewards>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabels: Vec<EventMark>,
}

impl Goal {
    pub fn is_active(&self) -> bool {
        self.state == GoalState::Active
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started.at
    }

    pub fn concluded_at(&self) -> Option<DateTime<Utc>> {
        self.concluded.as_ref().map(|m| m.at)
    }

    pub fn abandoned_at(&self) -> Option<DateTime<Utc>> {
        self.abandoned.as_ref().map(|m| m.at)
    }

    /// When the goal left the active state, if it has
    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.concluded_at().or_else(|| self.abandoned_at())
    }
}
