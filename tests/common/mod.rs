//! Common test utilities and helpers

use shaker_core::{ApiServer, GatewayConfig, TaskExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A gateway served on an ephemeral local port
pub struct TestGateway {
    pub base_url: String,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl TestGateway {
    /// Cancel the server and wait for it to finish
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

/// Start a gateway with the default executor and in-memory tasks
pub async fn start_gateway() -> TestGateway {
    start_gateway_with(None, None).await
}

/// Start a gateway with an optional tasks dir and executor
pub async fn start_gateway_with(
    tasks_dir: Option<PathBuf>,
    executor: Option<Arc<dyn TaskExecutor>>,
) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let base_url = format!("http://{}", addr);

    let mut config = GatewayConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = addr.port();
    config.server.base_url = Some(base_url.clone());
    config.tasks.dir = tasks_dir;
    config.streaming.keepalive_secs = 1;

    let server = ApiServer::with_executor(config, executor)
        .await
        .expect("Failed to create gateway");
    let shutdown = server.shutdown_token();

    let handle = tokio::spawn(async move {
        if let Err(e) = server.serve_on(listener).await {
            eprintln!("test gateway failed: {}", e);
        }
    });

    TestGateway {
        base_url,
        shutdown,
        handle,
    }
}
