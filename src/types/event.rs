//! Event types for Event Sourcing
//!
//! This module defines the events that make up the append-only log.
//! Events are immutable records of user actions; the current state is
//! derived by folding them in `(timestamp, clientId)` order.
//!
//! The envelope (`type`, `timestamp`, `clientId`) is parsed eagerly. The
//! payload stays as raw JSON until derivation so that a malformed payload
//! only costs that one event, and unknown future types survive a
//! load/save cycle untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::goal::{Difficulty, DurationClass, ResultTier, Rewards};
use super::node::NodeRef;

/// Event types that can occur in the system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A goal was started and its cost taken from the balance
    GoalStarted,
    /// A journal entry was added to an active goal
    GoalNurtured,
    /// A goal reached a result tier
    GoalConcluded,
    /// A goal was given up; part of its cost comes back
    GoalAbandoned,
    /// A dated reflection tied to a life facet
    ReflectionRecorded,
    /// A named organizational node was created
    GroupingCreated,
    /// The label or note of an addressable node changed
    NodeRelabeled,
    /// A type this build does not know about
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::GoalStarted => "goal_started",
            EventType::GoalNurtured => "goal_nurtured",
            EventType::GoalConcluded => "goal_concluded",
            EventType::GoalAbandoned => "goal_abandoned",
            EventType::ReflectionRecorded => "reflection_recorded",
            EventType::GroupingCreated => "grouping_created",
            EventType::NodeRelabeled => "node_relabeled",
            EventType::Other(name) => name,
        }
    }

    /// Whether this build knows how to fold the type
    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "goal_started" => EventType::GoalStarted,
            "goal_nurtured" => EventType::GoalNurtured,
            "goal_concluded" => EventType::GoalConcluded,
            "goal_abandoned" => EventType::GoalAbandoned,
            "reflection_recorded" => EventType::ReflectionRecorded,
            "grouping_created" => EventType::GroupingCreated,
            "node_relabeled" => EventType::NodeRelabeled,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the event - how it entered the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// A user action on some device
    #[default]
    Device,
    /// Synthesized from a pre-event-sourcing flat state
    Migration,
    /// Synthesized from a compaction snapshot (decompaction)
    Snapshot,
    /// Read from an export document
    Import,
}

/// Data payload for GoalStarted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalStartedData {
    pub goal_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub duration_class: DurationClass,
    pub difficulty: Difficulty,
    pub cost: u32,
}

/// Data payload for GoalNurtured event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalNurturedData {
    pub goal_id: String,
    pub text: String,
}

/// Data payload for GoalConcluded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalConcludedData {
    pub goal_id: String,
    pub result: ResultTier,
    pub rewards: Rewards,
}

/// Data payload for GoalAbandoned event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalAbandonedData {
    pub goal_id: String,
    pub refund: u32,
}

/// Data payload for ReflectionRecorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionRecordedData {
    pub facet_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_id: Option<String>,
}

/// Data payload for GroupingCreated event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingCreatedData {
    pub grouping_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Data payload for NodeRelabeled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRelabeledData {
    pub node: NodeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Typed payload, one variant per event type
///
/// Derivation dispatches on this enum so every type has to be handled
/// explicitly. `Unknown` carries the type name of events from newer builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    GoalStarted(GoalStartedData),
    GoalNurtured(GoalNurturedData),
    GoalConcluded(GoalConcludedData),
    GoalAbandoned(GoalAbandonedData),
    ReflectionRecorded(ReflectionRecordedData),
    GroupingCreated(GroupingCreatedData),
    NodeRelabeled(NodeRelabeledData),
    Unknown(String),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::GoalStarted(_) => EventType::GoalStarted,
            EventPayload::GoalNurtured(_) => EventType::GoalNurtured,
            EventPayload::GoalConcluded(_) => EventType::GoalConcluded,
            EventPayload::GoalAbandoned(_) => EventType::GoalAbandoned,
            EventPayload::ReflectionRecorded(_) => EventType::ReflectionRecorded,
            EventPayload::GroupingCreated(_) => EventType::GroupingCreated,
            EventPayload::NodeRelabeled(_) => EventType::NodeRelabeled,
            EventPayload::Unknown(name) => EventType::Other(name.clone()),
        }
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            EventPayload::GoalStarted(d) => serde_json::to_value(d),
            EventPayload::GoalNurtured(d) => serde_json::to_value(d),
            EventPayload::GoalConcluded(d) => serde_json::to_value(d),
            EventPayload::GoalAbandoned(d) => serde_json::to_value(d),
            EventPayload::ReflectionRecorded(d) => serde_json::to_value(d),
            EventPayload::GroupingCreated(d) => serde_json::to_value(d),
            EventPayload::NodeRelabeled(d) => serde_json::to_value(d),
            EventPayload::Unknown(_) => Ok(serde_json::Value::Object(Default::default())),
        }
    }
}

/// An immutable event in the event log
///
/// `client_id` is the idempotency key: it is generated once on the device
/// that recorded the action and never changes as the event travels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Type of event
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// When the action happened, as seen by the recording device
    pub timestamp: DateTime<Utc>,

    /// Globally unique idempotency key
    #[serde(rename = "clientId")]
    pub client_id: String,

    /// How the event entered the log
    #[serde(default, skip_serializing_if = "is_default_source")]
    pub source: EventSource,

    /// Device that recorded the event (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Event-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
}

fn is_default_source(source: &EventSource) -> bool {
    matches!(source, EventSource::Device)
}

impl Event {
    /// Build an event from a typed payload
    pub fn new(
        payload: &EventPayload,
        timestamp: DateTime<Utc>,
        client_id: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type: payload.event_type(),
            timestamp,
            client_id: client_id.into(),
            source: EventSource::Device,
            device: None,
            data: payload.to_value()?,
        })
    }

    /// Set the device that recorded this event
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Set the event source
    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    /// Total order used by derivation
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.timestamp, self.client_id.as_str())
    }

    /// Parse the event data as a specific type
    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }

    /// Decode the typed payload
    ///
    /// Fails when a required field is missing or has the wrong shape.
    pub fn payload(&self) -> Result<EventPayload, serde_json::Error> {
        Ok(match &self.event_type {
            EventType::GoalStarted => EventPayload::GoalStarted(self.parse_data()?),
            EventType::GoalNurtured => EventPayload::GoalNurtured(self.parse_data()?),
            EventType::GoalConcluded => EventPayload::GoalConcluded(self.parse_data()?),
            EventType::GoalAbandoned => EventPayload::GoalAbandoned(self.parse_data()?),
            EventType::ReflectionRecorded => EventPayload::ReflectionRecorded(self.parse_data()?),
            EventType::GroupingCreated => EventPayload::GroupingCreated(self.parse_data()?),
            EventType::NodeRelabeled => EventPayload::NodeRelabeled(self.parse_data()?),
            EventType::Other(name) => EventPayload::Unknown(name.clone()),
        })
    }

    /// Serialize event to JSON string (for JSONL)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&EventType::GoalStarted).unwrap();
        assert_eq!(json, "\"goal_started\"");

        let parsed: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EventType::GoalStarted);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let line = r#"{"type":"habit_tracked","timestamp":"2024-01-01T12:00:00Z","clientId":"c-1","data":{"streak":3}}"#;
        let event = Event::from_json_line(line).unwrap();

        assert_eq!(event.event_type, EventType::Other("habit_tracked".to_string()));
        assert!(!event.event_type.is_known());
        assert_eq!(event.payload().unwrap(), EventPayload::Unknown("habit_tracked".to_string()));

        let out = event.to_json_line().unwrap();
        assert!(out.contains("\"type\":\"habit_tracked\""));
        assert!(out.contains("\"streak\":3"));
    }

    #[test]
    fn test_event_serialization() {
        let payload = EventPayload::GoalNurtured(GoalNurturedData {
            goal_id: "g-1".to_string(),
            text: "ran 5k".to_string(),
        });
        let event = Event::new(&payload, ts(), "c-42").unwrap().with_device("phone");

        let json = event.to_json_line().unwrap();
        assert!(json.contains("\"type\":\"goal_nurtured\""));
        assert!(json.contains("\"clientId\":\"c-42\""));
        assert!(json.contains("\"goalId\":\"g-1\""));
        assert!(json.contains("\"device\":\"phone\""));
        assert!(!json.contains("\"source\""));

        let parsed = Event::from_json_line(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.payload().unwrap(), payload);
    }

    #[test]
    fn test_missing_field_is_payload_error() {
        let event = Event {
            event_type: EventType::GoalStarted,
            timestamp: ts(),
            client_id: "c-1".to_string(),
            source: EventSource::Device,
            device: None,
            data: json!({ "goalId": "g-1", "title": "Learn piano" }),
        };

        assert!(event.payload().is_err());
    }

    #[test]
    fn test_parse_relabel_data() {
        let event = Event {
            event_type: EventType::NodeRelabeled,
            timestamp: ts(),
            client_id: "c-9".to_string(),
            source: EventSource::Migration,
            device: None,
            data: json!({ "node": { "kind": "facet", "id": "health" }, "note": "sleep first" }),
        };

        let data: NodeRelabeledData = event.parse_data().unwrap();
        assert_eq!(data.node.kind, NodeKind::Facet);
        assert_eq!(data.node.id, "health");
        assert!(data.label.is_none());
        assert_eq!(data.note.as_deref(), Some("sleep first"));
    }

    #[test]
    fn test_order_key_breaks_ties_by_client_id() {
        let payload = EventPayload::Unknown("x".to_string());
        let a = Event::new(&payload, ts(), "a").unwrap();
        let b = Event::new(&payload, ts(), "b").unwrap();
        assert!(a.order_key() < b.order_key());
    }
}
