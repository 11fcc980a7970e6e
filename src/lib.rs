//! Shaker - Agent Coordination Gateway
//!
//! An A2A gateway that lets independent agent processes create work, observe
//! its progress and exchange capability documents:
//! - Asynchronous task lifecycle with per-task subscriber fan-out
//! - Server-Sent Events streaming of task updates
//! - Project-scoped realtime push over websockets
//! - Agent card negotiation across historical schema versions
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Task model and update events
//! - **Storage**: Task store (in-memory with optional file durability)
//! - **Tasks**: Lifecycle manager and pluggable executors
//! - **Hub**: Actor-owned realtime connection registry
//! - **A2A**: Agent cards, SSE decoding and the HTTP client
//! - **API**: axum router serving all of the above
//!
//! # Example
//!
//! ```ignore
//! use shaker_core::{ApiServer, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = GatewayConfig::load(None)?;
//!     ApiServer::new(config).await?.serve().await
//! }
//! ```

pub mod a2a;
pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod storage;
pub mod tasks;
pub mod types;

// Re-export commonly used types
pub use a2a::{A2aClient, AgentCard, CapabilityShape, HttpA2aClient};
pub use api::ApiServer;
pub use config::GatewayConfig;
pub use error::{Result, ShakerError};
pub use hub::{Connection, Hub, ProjectEvent, RoutableEvent};
pub use storage::{MemoryTaskStore, TaskStore};
pub use tasks::{EchoExecutor, Subscription, TaskExecutor, TaskManager};
pub use types::{
    Artifact, ArtifactListResponse, ContentFormat, Message, SendMessageRequest, SendMessageResponse,
    Task, TaskEvent, TaskFilter, TaskListResponse, TaskMetadata, TaskResult, TaskStatus, TaskUpdate,
};
