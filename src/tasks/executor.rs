//! Pluggable task execution
//!
//! The lifecycle manager hands each running task to a [`TaskExecutor`]. When no
//! executor is configured, [`EchoExecutor`] acknowledges the message.

use crate::types::{rfc3339, Task, TaskResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::any::Any;

/// Performs the work behind a task
///
/// Errors are recorded on the task as a failure; they never reach the
/// caller that created the task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult>;
}

/// Default executor that echoes the inbound message
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult> {
        let mut data = Map::new();
        data.insert(
            "original_message".to_string(),
            Value::String(task.message.content.clone()),
        );
        data.insert(
            "processed_at".to_string(),
            Value::String(rfc3339(&Utc::now())),
        );

        Ok(TaskResult {
            data: Some(data),
            ..TaskResult::text(format!("Task received: {}", task.message.content))
        })
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_echo_executor_references_content() {
        let task = Task::pending(Message::text("hello"));
        let result = EchoExecutor.execute(&task).await.unwrap();

        assert_eq!(result.content, "Task received: hello");
        let data = result.data.unwrap();
        assert_eq!(data["original_message"], "hello");
        assert!(data.contains_key("processed_at"));
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
