//! HTTP API server
//!
//! Wires the task manager, realtime hub and agent card into one axum router
//! and serves it until shutdown.

use super::{a2a, agent_card, events, ws};
use crate::a2a::AgentCard;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::hub::Hub;
use crate::storage::{MemoryTaskStore, TaskStore};
use crate::tasks::{panic_message, TaskExecutor, TaskManager};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub hub: Hub,
    pub card: Arc<AgentCard>,
    pub instance_id: String,
    pub keepalive: Duration,
    pub outbound_capacity: usize,
    pub default_list_limit: usize,
    /// Cancelled when the server shuts down; open streams end on it
    pub shutdown: CancellationToken,
}

/// API server
pub struct ApiServer {
    config: GatewayConfig,
    state: AppState,
    hub_handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Open the task store, spawn the hub and build the server
    pub async fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_executor(config, None).await
    }

    /// Like [`new`](Self::new) with a custom task executor
    pub async fn with_executor(
        config: GatewayConfig,
        executor: Option<Arc<dyn TaskExecutor>>,
    ) -> Result<Self> {
        let store: Arc<dyn TaskStore> = match &config.tasks.dir {
            Some(dir) => Arc::new(MemoryTaskStore::open(dir).await?),
            None => Arc::new(MemoryTaskStore::new()),
        };

        let mut manager =
            TaskManager::new(store).with_subscriber_capacity(config.tasks.subscriber_capacity);
        if let Some(executor) = executor {
            manager = manager.with_executor(executor);
        }

        let (hub, hub_handle) = Hub::spawn().await?;
        let card = agent_card::gateway_card(&config.agent.version, &config.base_url());
        let instance_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        let state = AppState {
            manager: Arc::new(manager),
            hub,
            card: Arc::new(card),
            instance_id,
            keepalive: config.streaming.keepalive(),
            outbound_capacity: config.realtime.outbound_capacity,
            default_list_limit: config.tasks.default_list_limit,
            shutdown: CancellationToken::new(),
        };

        Ok(Self {
            config,
            state,
            hub_handle: Some(hub_handle),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.state.instance_id
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.state.manager
    }

    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Build router
    pub fn router(&self) -> Router {
        Self::build_router(self.state.clone())
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            // A2A
            .route("/a2a/v1/message", post(a2a::send_message))
            .route("/a2a/v1/message/stream", post(a2a::stream_message))
            .route("/a2a/v1/tasks", get(a2a::list_tasks))
            .route(
                "/a2a/v1/tasks/:task_id",
                get(a2a::get_task).delete(a2a::cancel_task),
            )
            .route("/.well-known/agent-card.json", get(agent_card::agent_card))
            // Realtime
            .route("/ws", get(ws::ws_handler))
            .route("/api/projects/:project_id/events", post(events::emit_event))
            // Health check
            .route("/health", get(health_handler))
            .fallback(a2a::operation_fallback)
            .with_state(state)
            // Middleware
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(panic_guard))
    }

    /// Bind the configured address and serve until shutdown
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires
    pub async fn serve_on(mut self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "Gateway [{}] listening on http://{}",
            self.state.instance_id, addr
        );
        info!("Agent card: {}/.well-known/agent-card.json", self.config.base_url());

        let router = self.router();
        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway [{}] stopped", self.state.instance_id);
        self.state.hub.stop();
        if let Some(handle) = self.hub_handle.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
        if self.hub_handle.is_some() {
            self.state.hub.stop();
        }
    }
}

/// Convert a panic in any handler into a 500
async fn panic_guard(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(
                "panic while handling {} {}: {}",
                method,
                path,
                panic_message(panic.as_ref())
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal server error" })),
            )
                .into_response()
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
    pub tasks_subscribed: usize,
    pub realtime_connections: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, realtime_connections) = match state.hub.connection_count().await {
        Ok(count) => ("ok", count),
        Err(e) => {
            error!("Health check could not reach hub: {}", e);
            ("degraded", 0)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
        tasks_subscribed: state.manager.subscribed_task_count(),
        realtime_connections,
    })
}
