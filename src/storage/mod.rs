//! Task storage layer
//!
//! Provides the keyed task store abstraction used by the lifecycle manager,
//! plus the in-memory implementation with optional one-file-per-task
//! durability.

pub mod memory;

pub use memory::MemoryTaskStore;

use crate::error::Result;
use crate::types::{Task, TaskFilter};
use async_trait::async_trait;

/// Storage backend for task records
///
/// Implementations hand out independent copies: mutating a returned task
/// never affects the stored record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task, failing on ID collision
    async fn create_task(&self, task: &Task) -> Result<()>;

    /// Fetch a task by ID
    async fn get_task(&self, id: &str) -> Result<Task>;

    /// Replace an existing task wholesale (last writer wins)
    async fn update_task(&self, task: &Task) -> Result<()>;

    /// List tasks matching the filter, then apply offset and limit
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Remove a task
    async fn delete_task(&self, id: &str) -> Result<()>;

    /// Number of stored tasks
    async fn count_tasks(&self) -> Result<usize>;
}
