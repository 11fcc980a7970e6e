//! Project event emission endpoint
//!
//! Collaborators outside the gateway push domain events here; the hub fans
//! them out to the project's realtime connections.

use super::server::AppState;
use crate::error::{Result, ShakerError};
use crate::hub::ProjectEvent;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Body of `POST /api/projects/{project_id}/events`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// `POST /api/projects/{project_id}/events`
pub async fn emit_event(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    payload: std::result::Result<Json<EmitEventRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(EmitEventRequest {
        event_type,
        payload,
    }) = payload?;
    if event_type.trim().is_empty() {
        return Err(ShakerError::Validation("event type is required".to_string()));
    }

    let event = match event_type.as_str() {
        "agent_update" => ProjectEvent::agent_update(project_id, payload),
        "task_update" => ProjectEvent::task_update(project_id, payload),
        "context_added" => ProjectEvent::context_added(project_id, payload),
        "standup_update" => ProjectEvent::standup_update(project_id, payload),
        custom => {
            debug!("Forwarding custom event type '{}'", custom);
            ProjectEvent::new(project_id, custom, payload)
        }
    };

    debug!("Emitting '{}' to project {}", event.event_type, project_id);
    state.hub.publish(&event)?;
    Ok(StatusCode::ACCEPTED)
}
