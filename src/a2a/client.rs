//! A2A HTTP client
//!
//! Talks to a remote agent's base URL: card discovery, task creation, task
//! queries, cancellation, SSE streaming and poll-until-terminal.

use super::card::AgentCard;
use super::sse::task_updates;
use super::MESSAGE_STREAM_PATH;
use crate::error::{Result, ShakerError};
use crate::tasks::MIN_POLL_INTERVAL;
use crate::types::{
    Artifact, ArtifactListResponse, SendMessageRequest, SendMessageResponse, Task, TaskFilter,
    TaskListResponse, TaskUpdate,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("Shaker-A2A-Client/", env!("CARGO_PKG_VERSION"));

const STREAM_QUEUE_CAPACITY: usize = 16;

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whole-request timeout for non-streaming calls
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Operations against a remote A2A agent
#[async_trait]
pub trait A2aClient: Send + Sync {
    async fn discover(&self, agent_url: &str) -> Result<AgentCard>;

    async fn send_message(
        &self,
        agent_url: &str,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse>;

    async fn get_task(&self, agent_url: &str, task_id: &str) -> Result<Task>;

    async fn list_tasks(&self, agent_url: &str, filter: &TaskFilter) -> Result<TaskListResponse>;

    async fn cancel_task(&self, agent_url: &str, task_id: &str) -> Result<()>;

    async fn list_artifacts(&self, agent_url: &str) -> Result<ArtifactListResponse>;

    async fn get_artifact(&self, agent_url: &str, artifact_id: &str) -> Result<Artifact>;

    /// Create a task over SSE; the queue closes after a final update or when
    /// the server ends the stream
    async fn stream_message(
        &self,
        agent_url: &str,
        request: &SendMessageRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TaskUpdate>>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// reqwest-backed client
#[derive(Clone)]
pub struct HttpA2aClient {
    http: reqwest::Client,
    /// No whole-request timeout, streams stay open as long as the task runs
    streaming: reqwest::Client,
}

impl HttpA2aClient {
    pub fn new() -> Result<Self> {
        Self::with_options(ClientOptions::default())
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()?;
        let streaming = reqwest::Client::builder()
            .connect_timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()?;

        Ok(Self { http, streaming })
    }

    /// Poll a remote task until it is terminal
    pub async fn poll_task(
        &self,
        agent_url: &str,
        task_id: &str,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Task> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(ShakerError::Cancelled(format!("poll of task {}", task_id)));
                }
                _ = &mut deadline => {
                    return Err(ShakerError::Timeout(format!(
                        "task {} not terminal after {:?}",
                        task_id, timeout
                    )));
                }
                _ = ticker.tick() => {
                    let task = self.get_task(agent_url, task_id).await?;
                    if task.is_terminal() {
                        return Ok(task);
                    }
                    debug!("Task {} still {}", task_id, task.status);
                }
            }
        }
    }
}

fn endpoint(agent_url: &str, path: &str) -> String {
    format!("{}{}", agent_url.trim_end_matches('/'), path)
}

/// Map a non-success response to an error, using the `{"error"}` body when present
async fn error_for(response: Response, context: &str) -> ShakerError {
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => format!("{}: {}", context, body.error),
        Err(_) => format!("{}: received status {}", context, status.as_u16()),
    };

    match status {
        StatusCode::NOT_FOUND => ShakerError::NotFound(message),
        StatusCode::BAD_REQUEST => ShakerError::Validation(message),
        StatusCode::CONFLICT => ShakerError::InvalidState(message),
        _ => ShakerError::Upstream(message),
    }
}

fn connect_error(agent_url: &str, e: reqwest::Error) -> ShakerError {
    ShakerError::Upstream(format!("{} unreachable: {}", agent_url, e))
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

impl HttpA2aClient {
    async fn open_stream(
        &self,
        agent_url: &str,
        path: &str,
        request: &SendMessageRequest,
    ) -> Result<Response> {
        self.streaming
            .post(endpoint(agent_url, path))
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        agent_url: &str,
        path: &str,
        context: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(endpoint(agent_url, path))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        if !response.status().is_success() {
            return Err(error_for(response, context).await);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl A2aClient for HttpA2aClient {
    async fn discover(&self, agent_url: &str) -> Result<AgentCard> {
        let url = endpoint(agent_url, "/.well-known/agent-card.json");
        debug!("Discovering agent card at {}", url);

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        if response.status() != StatusCode::OK {
            return Err(ShakerError::Upstream(format!(
                "discovery failed: received status {}",
                response.status().as_u16()
            )));
        }

        let body = response.bytes().await?;
        let card = AgentCard::decode(&body)?;
        for missing in card.validate() {
            debug!("{} ({})", missing, agent_url);
        }
        Ok(card)
    }

    async fn send_message(
        &self,
        agent_url: &str,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse> {
        let response = self
            .http
            .post(endpoint(agent_url, "/a2a/v1/message"))
            .json(request)
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        if !response.status().is_success() {
            return Err(error_for(response, "send message failed").await);
        }

        let accepted: SendMessageResponse = response.json().await?;
        info!("Remote task {} accepted by {}", accepted.task_id, agent_url);
        Ok(accepted)
    }

    async fn get_task(&self, agent_url: &str, task_id: &str) -> Result<Task> {
        let response = self
            .http
            .get(endpoint(agent_url, &format!("/a2a/v1/tasks/{}", task_id)))
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        if !response.status().is_success() {
            return Err(error_for(response, "get task failed").await);
        }
        Ok(response.json().await?)
    }

    async fn list_tasks(&self, agent_url: &str, filter: &TaskFilter) -> Result<TaskListResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(status) = filter.status {
            query.push(("status", status.to_string()));
        }
        if filter.limit > 0 {
            query.push(("limit", filter.limit.to_string()));
        }
        if filter.offset > 0 {
            query.push(("offset", filter.offset.to_string()));
        }

        let response = self
            .http
            .get(endpoint(agent_url, "/a2a/v1/tasks"))
            .query(&query)
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        if !response.status().is_success() {
            return Err(error_for(response, "list tasks failed").await);
        }
        Ok(response.json().await?)
    }

    async fn cancel_task(&self, agent_url: &str, task_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(endpoint(agent_url, &format!("/a2a/v1/tasks/{}", task_id)))
            .send()
            .await
            .map_err(|e| connect_error(agent_url, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST => Err(ShakerError::InvalidState(format!(
                "task {} cannot be cancelled",
                task_id
            ))),
            _ => Err(error_for(response, "cancel task failed").await),
        }
    }

    async fn list_artifacts(&self, agent_url: &str) -> Result<ArtifactListResponse> {
        self.get_json(agent_url, "/a2a/v1/artifacts", "list artifacts failed")
            .await
    }

    async fn get_artifact(&self, agent_url: &str, artifact_id: &str) -> Result<Artifact> {
        self.get_json(
            agent_url,
            &format!("/a2a/v1/artifacts/{}", artifact_id),
            &format!("get artifact {} failed", artifact_id),
        )
        .await
    }

    async fn stream_message(
        &self,
        agent_url: &str,
        request: &SendMessageRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TaskUpdate>> {
        let mut response = self.open_stream(agent_url, MESSAGE_STREAM_PATH, request).await?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            debug!(
                "{} does not serve {}, negotiating SSE on /a2a/v1/message",
                agent_url, MESSAGE_STREAM_PATH
            );
            response = self.open_stream(agent_url, "/a2a/v1/message", request).await?;
        }

        if !response.status().is_success() {
            return Err(error_for(response, "stream message failed").await);
        }
        if !is_event_stream(&response) {
            return Err(ShakerError::Upstream(format!(
                "{} answered a streaming request without an event stream",
                agent_url
            )));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut updates = Box::pin(task_updates(StreamReader::new(body)));

        let (tx, rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
        let agent = agent_url.to_string();
        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Stream from {} cancelled by caller", agent);
                        break;
                    }
                    next = updates.next() => match next {
                        Some(update) => update,
                        None => break,
                    },
                };

                if tx.send(update).await.is_err() {
                    warn!("Stream consumer for {} went away", agent);
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, TaskStatus};
    use axum::{
        extract::Path,
        http::StatusCode as HttpStatus,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    fn client() -> HttpA2aClient {
        HttpA2aClient::with_options(ClientOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    /// Serve a stand-in remote agent on an ephemeral port
    async fn remote_agent(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn artifact_agent() -> Router {
        let design = json!({
            "id": "a1",
            "name": "design.md",
            "type": "markdown",
            "content_type": "text/markdown",
            "content": "# Design",
            "size": 8,
            "created_at": "2024-01-01T00:00:00Z"
        });
        let listed = json!({ "artifacts": [design.clone()], "total": 1 });

        Router::new()
            .route("/a2a/v1/artifacts", get(move || async move { Json(listed) }))
            .route(
                "/a2a/v1/artifacts/:id",
                get(move |Path(id): Path<String>| async move {
                    if id == "a1" {
                        Ok(Json(design))
                    } else {
                        Err((
                            HttpStatus::NOT_FOUND,
                            Json(json!({ "error": format!("artifact {} not found", id) })),
                        ))
                    }
                }),
            )
    }

    #[tokio::test]
    async fn test_list_and_get_artifacts() {
        let agent = remote_agent(artifact_agent()).await;
        let client = client();

        let listed = client.list_artifacts(&agent).await.unwrap();
        assert_eq!(listed.total_count, 1);
        assert_eq!(listed.artifacts[0].artifact_type, "markdown");

        let artifact = client.get_artifact(&agent, "a1").await.unwrap();
        assert_eq!(artifact.name, "design.md");
        assert_eq!(artifact.content.as_deref(), Some("# Design"));
        assert!(artifact.url.is_none());

        let err = client.get_artifact(&agent, "missing").await.unwrap_err();
        assert!(matches!(err, ShakerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_artifacts_absent_on_agent_is_not_found() {
        let agent = remote_agent(Router::new()).await;
        let err = client().list_artifacts(&agent).await.unwrap_err();
        assert!(matches!(err, ShakerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_accept_negotiation() {
        // Agent without the colon route: only `/a2a/v1/message` speaks SSE
        let body = "event: task_created\n\
            data: {\"task_id\":\"t1\",\"status\":\"pending\"}\n\n\
            event: completed\n\
            data: {\"id\":\"t1\",\"status\":\"completed\"}\n\n";
        let router = Router::new().route(
            "/a2a/v1/message",
            post(move || async move {
                ([(axum::http::header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        );
        let agent = remote_agent(router).await;

        let mut updates = client()
            .stream_message(
                &agent,
                &SendMessageRequest::new(Message::text("legacy")),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut names = Vec::new();
        while let Some(update) = updates.recv().await {
            names.push(update.event);
        }
        assert_eq!(names, vec!["task_created", "completed"]);
    }

    #[tokio::test]
    async fn test_stream_without_event_stream_is_upstream_error() {
        let router = Router::new().route(
            "/a2a/v1/message",
            post(|| async {
                (
                    HttpStatus::ACCEPTED,
                    Json(json!({ "task_id": "t1", "status": TaskStatus::Pending })),
                )
            }),
        );
        let agent = remote_agent(router).await;

        let err = client()
            .stream_message(
                &agent,
                &SendMessageRequest::new(Message::text("no sse")),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShakerError::Upstream(_)));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            endpoint("http://agent.local/", "/a2a/v1/message"),
            "http://agent.local/a2a/v1/message"
        );
        assert_eq!(
            endpoint("http://agent.local", "/.well-known/agent-card.json"),
            "http://agent.local/.well-known/agent-card.json"
        );
    }

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.user_agent.starts_with("Shaker-A2A-Client/"));
        assert!(HttpA2aClient::with_options(options).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_upstream_error() {
        let client = HttpA2aClient::with_options(ClientOptions {
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = client.discover("http://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, ShakerError::Upstream(_)));
    }
}
