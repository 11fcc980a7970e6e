//! Realtime broadcast hub
//!
//! Project-scoped registry of live realtime connections with typed event
//! fan-out. The registry is owned by [`HubActor`]; [`Hub`] is the cloneable
//! handle the rest of the gateway talks to.

pub mod actor;
pub mod connection;
pub mod events;

pub use actor::{HubActor, HubMessage};
pub use connection::{Connection, DEFAULT_OUTBOUND_CAPACITY};
pub use events::{HubFrame, ProjectEvent, RoutableEvent};

use crate::error::{Result, ShakerError};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle to the running hub actor
#[derive(Clone)]
pub struct Hub {
    actor: ActorRef<HubMessage>,
}

impl Hub {
    /// Spawn the hub actor
    pub async fn spawn() -> Result<(Self, JoinHandle<()>)> {
        let (actor, handle) = Actor::spawn(None, HubActor, ())
            .await
            .map_err(|e| ShakerError::Hub(format!("failed to spawn hub: {}", e)))?;
        Ok((Self { actor }, handle))
    }

    pub fn register(&self, connection: Connection) -> Result<()> {
        self.send(HubMessage::Register(connection))
    }

    /// Unregister a connection; unknown IDs are a no-op
    pub fn unregister(&self, connection_id: &str) -> Result<()> {
        self.send(HubMessage::Unregister(connection_id.to_string()))
    }

    /// Serialize `{type, payload}` once and push it to the project's connections
    pub fn broadcast_to_project(
        &self,
        project_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        let frame = HubFrame {
            event_type: event_type.to_string(),
            payload,
        };
        let frame: Arc<str> = serde_json::to_string(&frame)?.into();
        self.send(HubMessage::Broadcast { project_id, frame })
    }

    /// Route a typed event to its project
    pub fn publish<E: RoutableEvent + ?Sized>(&self, event: &E) -> Result<()> {
        self.broadcast_to_project(event.project_id(), event.event_type(), event.payload())
    }

    pub async fn connection_count(&self) -> Result<usize> {
        self.call(HubMessage::ConnectionCount).await
    }

    pub async fn project_connection_count(&self, project_id: Uuid) -> Result<usize> {
        self.call(|reply| HubMessage::ProjectConnectionCount(project_id, reply))
            .await
    }

    /// Stop the actor, closing every registered connection
    pub fn stop(&self) {
        self.actor.stop(Some("hub shutdown".to_string()));
    }

    fn send(&self, message: HubMessage) -> Result<()> {
        self.actor
            .cast(message)
            .map_err(|e| ShakerError::Hub(format!("hub unavailable: {}", e)))
    }

    async fn call<T, F>(&self, build: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(ractor::RpcReplyPort<T>) -> HubMessage,
    {
        match self.actor.call(build, None).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(ShakerError::Hub("hub call timed out".to_string())),
            Ok(CallResult::SenderError) => {
                Err(ShakerError::Hub("hub dropped the reply".to_string()))
            }
            Err(e) => Err(ShakerError::Hub(format!("hub unavailable: {}", e))),
        }
    }
}
