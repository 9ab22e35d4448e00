//! Addressable nodes and event provenance marks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which event produced a recorded fact, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMark {
    pub client_id: String,
    pub at: DateTime<Utc>,
}

impl EventMark {
    pub fn new(client_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            client_id: client_id.into(),
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Grouping,
    Goal,
    Facet,
}

/// Reference to a node that can be relabeled
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: NodeKind,
    pub id: String,
}

impl NodeRef {
    pub fn grouping(id: impl Into<String>) -> Self {
        Self { kind: NodeKind::Grouping, id: id.into() }
    }

    pub fn goal(id: impl Into<String>) -> Self {
        Self { kind: NodeKind::Goal, id: id.into() }
    }

    pub fn facet(id: impl Into<String>) -> Self {
        Self { kind: NodeKind::Facet, id: id.into() }
    }
}

/// User label for a life facet
///
/// Facets are fixed identifiers; they only exist in state once relabeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetLabel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub relabels: Vec<EventMark>,
}
