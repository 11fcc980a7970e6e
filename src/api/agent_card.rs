//! This gateway's own agent card

use super::server::AppState;
use crate::a2a::{
    AgentCard, AuthScheme, Capabilities, Endpoint, Provider, Skill, MESSAGE_STREAM_PATH,
};
use axum::{extract::State, Json};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

fn endpoint(path: &str, method: &str, description: &str, protocol: &str) -> Endpoint {
    Endpoint {
        path: path.to_string(),
        method: method.to_string(),
        description: description.to_string(),
        protocol: protocol.to_string(),
        params: None,
    }
}

/// Build the card advertised at `/.well-known/agent-card.json`
pub fn gateway_card(version: &str, base_url: &str) -> AgentCard {
    let base_url = base_url.trim_end_matches('/');

    let mut list_params = BTreeMap::new();
    list_params.insert(
        "status".to_string(),
        "Filter by task status (pending, running, completed, failed)".to_string(),
    );
    list_params.insert("limit".to_string(), "Maximum number of tasks to return".to_string());
    list_params.insert("offset".to_string(), "Offset for pagination".to_string());

    let mut metadata = Map::new();
    metadata.insert("supported_protocols".to_string(), json!(["A2A", "WebSocket"]));
    metadata.insert("websocket_available".to_string(), Value::Bool(true));
    metadata.insert("sse_available".to_string(), Value::Bool(true));

    AgentCard {
        schema_version: Some("1.0".to_string()),
        human_readable_id: Some("shaker/gateway".to_string()),
        agent_version: Some(version.to_string()),
        name: Some("Agent Shaker".to_string()),
        description: Some(
            "Agent coordination gateway with asynchronous A2A tasks, SSE streaming and \
             project-scoped realtime notifications"
                .to_string(),
        ),
        url: Some(format!("{}/a2a/v1", base_url)),
        provider: Some(Provider {
            name: "Agent Shaker Contributors".to_string(),
            url: base_url.to_string(),
            support_contact: format!("{}/health", base_url),
        }),
        capabilities: Capabilities {
            a2a_version: Some("1.0".to_string()),
            mcp_version: None,
            supported_message_parts: vec!["text".to_string(), "data".to_string()],
            supports_push_notifications: true,
        },
        auth_schemes: vec![AuthScheme {
            scheme: "none".to_string(),
            description: "Public endpoints require no authentication".to_string(),
        }],
        skills: vec![
            Skill {
                id: "task_execution".to_string(),
                name: "Asynchronous Task Execution".to_string(),
                description: "Execute tasks asynchronously with status tracking and result retrieval"
                    .to_string(),
                input_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "object",
                            "properties": {
                                "content": {"type": "string"},
                                "format": {"type": "string", "enum": ["text", "markdown"]}
                            },
                            "required": ["content"]
                        }
                    },
                    "required": ["message"]
                })),
            },
            Skill {
                id: "sse_streaming".to_string(),
                name: "Server-Sent Events Streaming".to_string(),
                description: "Real-time task updates via Server-Sent Events".to_string(),
                input_schema: None,
            },
        ],
        tags: ["agent-coordination", "task-management", "a2a", "real-time", "streaming"]
            .iter()
            .map(|tag| tag.to_string())
            .collect(),
        version: Some(version.to_string()),
        endpoints: vec![
            endpoint("/a2a/v1/message", "POST", "Send a new task to the agent", "A2A"),
            endpoint(
                MESSAGE_STREAM_PATH,
                "POST",
                "Send a task and receive streaming updates via SSE",
                "A2A",
            ),
            Endpoint {
                params: Some(list_params),
                ..endpoint(
                    "/a2a/v1/tasks",
                    "GET",
                    "List tasks with optional status filtering",
                    "A2A",
                )
            },
            endpoint("/a2a/v1/tasks/{taskId}", "GET", "Get details of a specific task", "A2A"),
            endpoint("/a2a/v1/tasks/{taskId}", "DELETE", "Cancel a task", "A2A"),
            endpoint("/ws", "GET", "WebSocket endpoint for real-time notifications", "WebSocket"),
        ],
        metadata,
        ..AgentCard::default()
    }
}

/// `GET /.well-known/agent-card.json`
pub async fn agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}
