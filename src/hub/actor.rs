//! Hub actor owning the realtime registry
//!
//! Registration, unregistration and broadcast iteration are all messages to
//! this one actor, handled strictly one at a time. The connection maps are
//! therefore never shared and never locked.

use super::connection::Connection;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Messages accepted by the hub actor
pub enum HubMessage {
    /// Add a connection under its project
    Register(Connection),

    /// Remove a connection and close its outbound queue
    Unregister(String),

    /// Push a serialized frame to every connection of a project
    Broadcast { project_id: Uuid, frame: Arc<str> },

    /// Total live connections
    ConnectionCount(RpcReplyPort<usize>),

    /// Live connections registered under one project
    ProjectConnectionCount(Uuid, RpcReplyPort<usize>),
}

/// Registry state
#[derive(Default)]
pub struct HubState {
    connections: HashMap<String, Connection>,
    projects: HashMap<Uuid, HashSet<String>>,
}

impl HubState {
    fn register(&mut self, connection: Connection) {
        let id = connection.id().to_string();
        let project_id = connection.project_id();

        self.projects
            .entry(project_id)
            .or_default()
            .insert(id.clone());
        self.connections.insert(id.clone(), connection);

        tracing::info!("Connection {} registered for project {}", id, project_id);
    }

    /// Drop both index entries; dropping the connection closes its queue
    fn unregister(&mut self, id: &str) -> bool {
        let Some(connection) = self.connections.remove(id) else {
            return false;
        };

        let project_id = connection.project_id();
        if let Some(members) = self.projects.get_mut(&project_id) {
            members.remove(id);
            if members.is_empty() {
                self.projects.remove(&project_id);
            }
        }

        tracing::info!("Connection {} unregistered from project {}", id, project_id);
        true
    }

    fn broadcast(&mut self, project_id: Uuid, frame: Arc<str>) {
        let Some(members) = self.projects.get(&project_id) else {
            tracing::debug!("No connections for project {}", project_id);
            return;
        };

        let mut dead = Vec::new();
        for id in members {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };
            match connection.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Connection {} outbound queue full, dropping it", id);
                    dead.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Connection {} already closed", id);
                    dead.push(id.clone());
                }
            }
        }

        tracing::debug!(
            "Broadcast to project {}: {} delivered, {} dropped",
            project_id,
            members.len() - dead.len(),
            dead.len()
        );

        for id in dead {
            self.unregister(&id);
        }
    }

    fn project_connection_count(&self, project_id: &Uuid) -> usize {
        self.projects.get(project_id).map_or(0, HashSet::len)
    }
}

/// Single owner of the realtime registry
pub struct HubActor;

#[ractor::async_trait]
impl Actor for HubActor {
    type Msg = HubMessage;
    type State = HubState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        tracing::info!("Realtime hub starting");
        Ok(HubState::default())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            HubMessage::Register(connection) => state.register(connection),
            HubMessage::Unregister(id) => {
                if !state.unregister(&id) {
                    tracing::debug!("Unregister of unknown connection {}", id);
                }
            }
            HubMessage::Broadcast { project_id, frame } => state.broadcast(project_id, frame),
            HubMessage::ConnectionCount(reply) => {
                let _ = reply.send(state.connections.len());
            }
            HubMessage::ProjectConnectionCount(project_id, reply) => {
                let _ = reply.send(state.project_connection_count(&project_id));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        let remaining = state.connections.len();
        state.projects.clear();
        state.connections.clear();
        tracing::info!("Realtime hub stopped, closed {} connections", remaining);
        Ok(())
    }
}
