//! Project-scoped realtime events
//!
//! Anything the hub can route implements [`RoutableEvent`]: the project is
//! decided by the producer, never inferred from the payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event that knows which project it belongs to
pub trait RoutableEvent {
    fn project_id(&self) -> Uuid;

    fn event_type(&self) -> &str;

    fn payload(&self) -> Value;
}

/// Wire frame delivered to realtime connections: `{type, payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

/// Domain event pushed by collaborators into the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvent {
    pub project_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl ProjectEvent {
    pub fn new(project_id: Uuid, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            project_id,
            event_type: event_type.into(),
            payload,
        }
    }

    pub fn agent_update(project_id: Uuid, agent: Value) -> Self {
        Self::new(project_id, "agent_update", agent)
    }

    pub fn task_update(project_id: Uuid, task: Value) -> Self {
        Self::new(project_id, "task_update", task)
    }

    pub fn context_added(project_id: Uuid, context: Value) -> Self {
        Self::new(project_id, "context_added", context)
    }

    pub fn standup_update(project_id: Uuid, standup: Value) -> Self {
        Self::new(project_id, "standup_update", standup)
    }
}

impl RoutableEvent for ProjectEvent {
    fn project_id(&self) -> Uuid {
        self.project_id
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn payload(&self) -> Value {
        self.payload.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_uses_type_key() {
        let frame = HubFrame {
            event_type: "agent_update".to_string(),
            payload: json!({"name": "builder"}),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json, json!({"type": "agent_update", "payload": {"name": "builder"}}));
    }

    #[test]
    fn test_project_event_routes_by_declared_project() {
        let project = Uuid::new_v4();
        let event = ProjectEvent::task_update(project, json!({"project_id": "ignored"}));
        assert_eq!(event.project_id(), project);
        assert_eq!(event.event_type(), "task_update");
    }
}
