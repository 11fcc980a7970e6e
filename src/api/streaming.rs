//! SSE streaming of task updates
//!
//! A streaming create request gets a `text/event-stream` response: a
//! `task_created` frame, then one frame per task update until the final one,
//! with keepalive comments in between.

use super::server::AppState;
use crate::error::Result;
use crate::tasks::{Subscription, TaskManager};
use crate::types::{rfc3339, SendMessageRequest, Task, TaskEvent, TaskUpdate};
use async_stream::stream;
use axum::{
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use chrono::Utc;
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Create a task and answer with its live event stream
pub async fn stream_task(state: &AppState, request: SendMessageRequest) -> Result<Response> {
    let (task, subscription) = state.manager.create_and_subscribe(request).await?;
    info!("Streaming updates for task {}", task.id);

    let events = task_events(
        Arc::clone(&state.manager),
        task,
        subscription,
        state.keepalive,
        state.shutdown.clone(),
    );

    let mut response = Sse::new(events).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    Ok(response)
}

/// Detaches the subscription when the stream is dropped, including on
/// client disconnect
struct SubscriptionGuard {
    manager: Arc<TaskManager>,
    task_id: String,
    subscription_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.manager.unsubscribe(&self.task_id, self.subscription_id);
        debug!("SSE stream for task {} closed", self.task_id);
    }
}

enum Step {
    Update(TaskUpdate),
    Keepalive,
    Closed,
    Shutdown,
}

fn update_frame(event: &str, data: &serde_json::Value) -> Event {
    Event::default().event(event).data(data.to_string())
}

fn task_events(
    manager: Arc<TaskManager>,
    task: Task,
    mut subscription: Subscription,
    keepalive: Duration,
    shutdown: CancellationToken,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream! {
        let _guard = SubscriptionGuard {
            manager,
            task_id: task.id.clone(),
            subscription_id: subscription.id(),
        };

        let created = json!({
            "task_id": task.id,
            "status": task.status,
            "created_at": rfc3339(&task.created_at),
        });
        yield Ok(update_frame(TaskEvent::Created.name(), &created));

        let mut ticker = interval_at(Instant::now() + keepalive, keepalive);

        loop {
            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                update = subscription.recv() => match update {
                    Some(update) => Step::Update(update),
                    None => Step::Closed,
                },
                _ = ticker.tick() => Step::Keepalive,
            };

            match step {
                Step::Update(update) => {
                    let is_final = update.is_final;
                    yield Ok(update_frame(&update.event, &update.data));
                    if is_final {
                        break;
                    }
                }
                Step::Keepalive => {
                    yield Ok(Event::default().comment(format!("keepalive {}", rfc3339(&Utc::now()))));
                }
                Step::Closed => break,
                Step::Shutdown => {
                    debug!("Server shutting down, ending SSE stream for task {}", task.id);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTaskStore;
    use crate::types::Message;
    use futures::StreamExt;

    fn manager() -> Arc<TaskManager> {
        Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())))
    }

    #[tokio::test]
    async fn test_stream_ends_after_final_update_and_detaches() {
        let manager = manager();
        let (task, subscription) = manager
            .create_and_subscribe(SendMessageRequest::new(Message::text("hello")))
            .await
            .unwrap();

        let events: Vec<_> = task_events(
            Arc::clone(&manager),
            task,
            subscription,
            Duration::from_secs(15),
            CancellationToken::new(),
        )
        .collect()
        .await;

        // task_created, status, completed
        assert_eq!(events.len(), 3);
        assert_eq!(manager.subscribed_task_count(), 0);
    }

    struct Never;

    #[async_trait::async_trait]
    impl crate::tasks::TaskExecutor for Never {
        async fn execute(&self, _task: &Task) -> anyhow::Result<crate::types::TaskResult> {
            futures::future::pending().await
        }
    }

    fn stalled_manager() -> Arc<TaskManager> {
        Arc::new(TaskManager::new(Arc::new(MemoryTaskStore::new())).with_executor(Arc::new(Never)))
    }

    #[tokio::test]
    async fn test_keepalive_comments_while_task_runs() {
        let manager = stalled_manager();
        let (task, subscription) = manager
            .create_and_subscribe(SendMessageRequest::new(Message::text("slow")))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let events = task_events(
            Arc::clone(&manager),
            task,
            subscription,
            Duration::from_millis(50),
            shutdown.clone(),
        );
        let body = Sse::new(events).into_response().into_body().into_data_stream();
        tokio::pin!(body);

        let mut text = String::new();
        let collected = tokio::time::timeout(Duration::from_secs(5), async {
            while text.matches(": keepalive ").count() < 2 {
                let chunk = body.next().await.unwrap().unwrap();
                text.push_str(std::str::from_utf8(&chunk).unwrap());
            }
        })
        .await;
        assert!(collected.is_ok(), "no keepalive within deadline: {:?}", text);

        assert!(text.starts_with("event: task_created\n"));
        assert!(text.contains("event: status\n"));
        let keepalive = text
            .lines()
            .find(|line| line.starts_with(": keepalive "))
            .unwrap();
        let stamp = keepalive.trim_start_matches(": keepalive ");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());

        shutdown.cancel();
        while body.next().await.is_some() {}
        assert_eq!(manager.subscribed_task_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let manager = stalled_manager();
        let (task, subscription) = manager
            .create_and_subscribe(SendMessageRequest::new(Message::text("forever")))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let events = task_events(
            Arc::clone(&manager),
            task,
            subscription,
            Duration::from_secs(15),
            shutdown.clone(),
        );
        tokio::pin!(events);

        assert!(events.next().await.is_some());
        shutdown.cancel();
        while events.next().await.is_some() {}
        assert_eq!(manager.subscribed_task_count(), 0);
    }
}
