//! Grouping and reflection entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::EventMark;

/// A named organizational node; goals and other groupings hang off it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created: EventMark,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relabels: Vec<EventMark>,
}

/// A dated note tied to a facet; keyed by the recording event's client id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub id: String,
    pub facet_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
