//! A2A protocol support
//!
//! Agent card negotiation, SSE decoding and the HTTP client used to talk to
//! remote agents.

/// Streaming task creation, in the protocol's `resource:verb` form
pub const MESSAGE_STREAM_PATH: &str = "/a2a/v1/message:stream";

pub mod card;
pub mod client;
pub mod sse;

pub use card::{
    AgentCard, AuthScheme, Capabilities, CapabilityShape, Endpoint, LegacyCapability,
    MissingField, Provider, Skill, LEGACY_CAPABILITIES_KEY,
};
pub use client::{A2aClient, ClientOptions, HttpA2aClient};
pub use sse::{task_updates, SseFrame, SseFrameParser};
