//! Wire shapes for real-time distribution.
//!
//! Two envelopes travel through the engine:
//!
//! - [`DistributionEvent`]: carried by the relay between server processes,
//!   published on `logs:<project_id>`.
//! - [`ViewerEnvelope`]: what a dashboard viewer receives over its socket,
//!   shaped `{type, data, project_id}`.
//!
//! ## Wire Format (viewer)
//!
//! ```text
//! {"type":"log","data":{"id":"...","level":"ERROR",...},"project_id":"proj-1"}
//! {"type":"pong"}
//! ```
//!
//! Consumers should ignore unknown fields.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults::RELAY_TOPIC_PREFIX;

/// Event type tag for relayed log rows.
pub const EVENT_TYPE_LOG: &str = "log";

/// Relay topic for a project.
pub fn relay_topic(project_id: &str) -> String {
    format!("{RELAY_TOPIC_PREFIX}{project_id}")
}

/// Project id encoded in a relay topic, if the topic is a project topic.
pub fn project_from_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(RELAY_TOPIC_PREFIX)
        .filter(|project| !project.is_empty())
}

// ============================================================================
// Distribution Event
// ============================================================================

/// A log event in flight between ingestion and every process's hub.
///
/// `payload` is the already-serialized log row; the engine never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub project_id: String,
    pub payload: JsonValue,
}

impl DistributionEvent {
    /// A `"log"` event for `project_id`.
    pub fn log(project_id: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event_type: EVENT_TYPE_LOG.to_string(),
            project_id: project_id.into(),
            payload,
        }
    }
}

// ============================================================================
// Viewer Envelope
// ============================================================================

/// Message sent from the server to a viewer connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ViewerEnvelope {
    /// Liveness reply to a client `ping`.
    pub fn pong() -> Self {
        Self {
            event_type: "pong".to_string(),
            data: None,
            project_id: None,
        }
    }

    /// Greeting sent once a connection is registered with the hub.
    pub fn connected(subject_id: &str, project_id: Option<&str>) -> Self {
        Self {
            event_type: "connected".to_string(),
            data: Some(serde_json::json!({ "subject_id": subject_id })),
            project_id: project_id.map(String::from),
        }
    }
}

impl From<&DistributionEvent> for ViewerEnvelope {
    fn from(event: &DistributionEvent) -> Self {
        Self {
            event_type: event.event_type.clone(),
            data: Some(event.payload.clone()),
            project_id: Some(event.project_id.clone()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
