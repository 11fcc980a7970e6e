//! Core data types for the Shaker gateway
//!
//! This module defines the A2A task model shared by the store, the lifecycle
//! manager, the HTTP API and the client: tasks and their status machine,
//! inbound messages, results, list filters and the ephemeral update events
//! pushed to subscribers.

use crate::error::{Result, ShakerError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Task status state machine
///
/// Transitions are monotonic: `pending -> running -> {completed | failed}`.
/// A cancel forces any non-terminal status straight to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed and failed tasks never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the regular lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ShakerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ShakerError::Validation(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

/// Content format of messages and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    #[default]
    Text,
    Markdown,
}

/// Inbound message a task is created from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message body (required, non-empty)
    pub content: String,
    /// Free-form caller context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    /// Body format, `text` when omitted
    #[serde(default)]
    pub format: ContentFormat,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            context: None,
            format: ContentFormat::Text,
        }
    }
}

/// Optional request metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Executor deadline in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

/// Request to create a task from a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: Message,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl SendMessageRequest {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            metadata: TaskMetadata::default(),
        }
    }

    /// Reject requests that must never reach the store
    pub fn validate(&self) -> Result<()> {
        if self.message.content.trim().is_empty() {
            return Err(ShakerError::Validation(
                "message content is required".to_string(),
            ));
        }
        if self.metadata.timeout == Some(0) {
            return Err(ShakerError::Validation(
                "metadata.timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Acknowledgement returned when a task is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub task_id: String,
    pub status: TaskStatus,
    /// RFC3339 creation timestamp
    pub created_at: String,
}

impl From<&Task> for SendMessageResponse {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            status: task.status,
            created_at: rfc3339(&task.created_at),
        }
    }
}

/// Outcome of a finished task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub content: String,
    #[serde(default)]
    pub format: ContentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl TaskResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            format: ContentFormat::Text,
            data: None,
        }
    }
}

/// A unit of asynchronous work tracked through the status machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Allocate a pending task with a fresh ID
    pub fn pending(message: Message) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            message,
            result: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move along the regular lifecycle, stamping timestamps
    ///
    /// `completed_at` is set exactly when the new status is terminal.
    pub fn transition(&mut self, next: TaskStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ShakerError::InvalidState(format!(
                "task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = at;
        if next.is_terminal() {
            self.completed_at = Some(at);
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Filter for listing tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Status equality filter
    pub status: Option<TaskStatus>,
    /// Maximum number of tasks, 0 for unlimited
    pub limit: usize,
    /// Number of matching tasks to skip
    pub offset: usize,
}

/// Response body for task listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub total_count: usize,
}

/// A document a remote agent exposes (markdown context, JSON, binary file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// `markdown`, `json` or `binary`
    #[serde(rename = "type", default)]
    pub artifact_type: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Response body for artifact listings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactListResponse {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(rename = "total", default)]
    pub total_count: usize,
}

/// Names of the events a task emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Created,
    Status,
    Completed,
    Failed,
    Cancelled,
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Created => "task_created",
            TaskEvent::Status => "status",
            TaskEvent::Completed => "completed",
            TaskEvent::Failed => "failed",
            TaskEvent::Cancelled => "cancelled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "task_created" => Some(TaskEvent::Created),
            "status" => Some(TaskEvent::Status),
            "completed" => Some(TaskEvent::Completed),
            "failed" => Some(TaskEvent::Failed),
            "cancelled" => Some(TaskEvent::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Completed | TaskEvent::Failed | TaskEvent::Cancelled
        )
    }
}

/// Ephemeral update pushed to task subscribers, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub event: String,
    pub data: Value,
    pub is_final: bool,
}

impl TaskUpdate {
    pub fn new(event: TaskEvent, data: Value) -> Self {
        Self {
            event: event.name().to_string(),
            data,
            is_final: event.is_terminal(),
        }
    }

    /// Build an update from a wire event name, marking terminal names final
    pub fn from_wire(event: impl Into<String>, data: Value) -> Self {
        let event = event.into();
        let is_final = TaskEvent::from_name(&event)
            .map(|kind| kind.is_terminal())
            .unwrap_or(false);
        Self {
            event,
            data,
            is_final,
        }
    }
}

/// Format a timestamp the way the wire protocol expects
pub fn rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
