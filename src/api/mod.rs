//! HTTP API
//!
//! Provides:
//! - A2A task endpoints with SSE streaming
//! - The agent card at `/.well-known/agent-card.json`
//! - Project-scoped realtime websockets and event emission
//! - Health check

pub mod a2a;
pub mod agent_card;
pub mod error;
pub mod events;
pub mod server;
pub mod streaming;
pub mod ws;

pub use agent_card::gateway_card;
pub use events::EmitEventRequest;
pub use server::{ApiServer, AppState, HealthResponse};
