//! Realtime websocket transport
//!
//! `GET /ws?project_id=<uuid>` upgrades to a websocket registered with the hub
//! under that project. A writer loop drains the outbound queue to the socket
//! and a reader loop discards inbound frames; whichever ends first
//! unregisters the connection.

use super::server::AppState;
use crate::error::{Result, ShakerError};
use crate::hub::{Connection, Hub};
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    project_id: Option<String>,
}

/// Parse the required `project_id` query parameter
fn project_id(query: &WsQuery) -> Result<Uuid> {
    let raw = query
        .project_id
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ShakerError::Validation("project_id is required".to_string()))?;

    Uuid::parse_str(raw)
        .map_err(|e| ShakerError::Validation(format!("invalid project_id '{}': {}", raw, e)))
}

/// `GET /ws`
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let project_id = match project_id(&query) {
        Ok(project_id) => project_id,
        Err(e) => return e.into_response(),
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = state.hub.clone();
    let capacity = state.outbound_capacity;
    upgrade.on_upgrade(move |socket| serve_socket(socket, hub, project_id, capacity))
}

/// Run one registered websocket connection to completion
pub async fn serve_socket(socket: WebSocket, hub: Hub, project_id: Uuid, capacity: usize) {
    let (connection, mut outbound) = Connection::new(project_id, capacity);
    let connection_id = connection.id().to_string();

    if let Err(e) = hub.register(connection) {
        warn!("Could not register websocket for project {}: {}", project_id, e);
        return;
    }

    let (mut sink, mut inbound) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = inbound.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => {
            debug!("Websocket {} writer finished", connection_id);
            reader.abort();
            let _ = hub.unregister(&connection_id);
        }
        _ = &mut reader => {
            debug!("Websocket {} reader finished", connection_id);
            let _ = hub.unregister(&connection_id);
            let _ = writer.await;
        }
    }
}
