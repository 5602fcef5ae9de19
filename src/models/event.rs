use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Wire shape of every message on the event feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssigned {
    #[serde(default)]
    pub task_id: Option<String>,
    pub title: String,

    #[serde(deserialize_with = "null_as_empty")]
    pub assigned_to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdated {
    #[serde(default)]
    pub task_id: Option<String>,
    pub title: String,
    pub status: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub assigned_to: Vec<String>,

    #[serde(default)]
    pub updated_by: String,

    #[serde(default)]
    pub updated_at: String,
}

/// Publishers encode an empty assignee list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TaskAssigned(TaskAssigned),
    TaskStatusUpdated(TaskStatusUpdated),
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("invalid payload for {event_type}: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DomainEvent {
    pub fn decode(raw: &[u8]) -> Result<Self, EventDecodeError> {
        let envelope =
            serde_json::from_slice::<EventEnvelope>(raw).map_err(EventDecodeError::Envelope)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, EventDecodeError> {
        let EventEnvelope {
            event_type,
            payload,
        } = envelope;

        match event_type.as_str() {
            "TaskAssigned" => serde_json::from_value(payload)
                .map(DomainEvent::TaskAssigned)
                .map_err(|source| EventDecodeError::Payload { event_type, source }),
            "TaskStatusUpdated" => serde_json::from_value(payload)
                .map(DomainEvent::TaskStatusUpdated)
                .map_err(|source| EventDecodeError::Payload { event_type, source }),
            _ => Ok(DomainEvent::Unknown(event_type)),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            DomainEvent::TaskAssigned(_) => "TaskAssigned",
            DomainEvent::TaskStatusUpdated(_) => "TaskStatusUpdated",
            DomainEvent::Unknown(event_type) => event_type,
        }
    }
}
