//! In-memory task store with optional file durability
//!
//! Records live in a `HashMap` behind a reader/writer lock. When opened with a
//! directory, every create/update also writes `<dir>/<task_id>.json` and the
//! directory is replayed on startup.

use super::TaskStore;
use crate::error::{Result, ShakerError};
use crate::types::{Task, TaskFilter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Task store keeping records in memory
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    dir: Option<PathBuf>,
}

impl MemoryTaskStore {
    /// Volatile store, nothing touches disk
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            dir: None,
        }
    }

    /// Durable store rooted at `dir`, replaying any task files already there
    ///
    /// A missing directory is not an error; it is created on first write.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let tasks = replay(&dir).await?;
        info!("Loaded {} tasks from {}", tasks.len(), dir.display());

        Ok(Self {
            tasks: RwLock::new(tasks),
            dir: Some(dir),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    async fn persist(&self, task: &Task) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        tokio::fs::create_dir_all(dir).await?;
        let body = serde_json::to_vec_pretty(task)?;
        let path = task_path(dir, &task.id);
        let tmp = dir.join(format!("{}.json.tmp", task.id));

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Persisted task {} to {}", task.id, path.display());
        Ok(())
    }

    async fn remove_file(&self, id: &str) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        match tokio::fs::remove_file(task_path(dir, id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn task_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.json", id))
}

async fn replay(dir: &Path) -> Result<HashMap<String, Task>> {
    let mut tasks = HashMap::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tasks),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            warn!("Skipping non-task file {}", path.display());
            continue;
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping unreadable task file {}: {}", path.display(), e);
                continue;
            }
        };

        match serde_json::from_slice::<Task>(&bytes) {
            Ok(task) => {
                tasks.insert(task.id.clone(), task);
            }
            Err(e) => warn!("Skipping corrupt task file {}: {}", path.display(), e),
        }
    }

    Ok(tasks)
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ShakerError::AlreadyExists(format!("task {}", task.id)));
        }

        self.persist(task).await?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ShakerError::NotFound(format!("task {}", id)))
    }

    async fn update_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(ShakerError::NotFound(format!("task {}", task.id)));
        }

        self.persist(task).await?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;

        let matching = tasks
            .values()
            .filter(|task| filter.status.map_or(true, |status| task.status == status));

        let limit = if filter.limit == 0 {
            usize::MAX
        } else {
            filter.limit
        };

        Ok(matching.skip(filter.offset).take(limit).cloned().collect())
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(id) {
            return Err(ShakerError::NotFound(format!("task {}", id)));
        }

        self.remove_file(id).await?;
        tasks.remove(id);
        Ok(())
    }

    async fn count_tasks(&self) -> Result<usize> {
        Ok(self.tasks.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, TaskStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn task(content: &str) -> Task {
        Task::pending(Message::text(content))
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = MemoryTaskStore::new();
        let t = task("hello");
        store.create_task(&t).await.unwrap();

        let fetched = store.get_task(&t.id).await.unwrap();
        assert_eq!(fetched, t);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let store = MemoryTaskStore::new();
        let t = task("hello");
        store.create_task(&t).await.unwrap();

        let err = store.create_task(&t).await.unwrap_err();
        assert!(matches!(err, ShakerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_missing_task_errors() {
        let store = MemoryTaskStore::new();
        assert!(matches!(
            store.get_task("nope").await,
            Err(ShakerError::NotFound(_))
        ));
        assert!(matches!(
            store.update_task(&task("x")).await,
            Err(ShakerError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_task("nope").await,
            Err(ShakerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_returned_copies_do_not_alias() {
        let store = MemoryTaskStore::new();
        let t = task("hello");
        store.create_task(&t).await.unwrap();

        let mut copy = store.get_task(&t.id).await.unwrap();
        copy.transition(TaskStatus::Running, Utc::now()).unwrap();

        let stored = store.get_task(&t.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_filter_offset_limit() {
        let store = MemoryTaskStore::new();
        for i in 0..5 {
            let mut t = task(&format!("task {}", i));
            if i % 2 == 0 {
                t.transition(TaskStatus::Running, Utc::now()).unwrap();
            }
            store.create_task(&t).await.unwrap();
        }

        let all = store.list_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 5);

        let running = store
            .list_tasks(&TaskFilter {
                status: Some(TaskStatus::Running),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(running.len(), 3);
        assert!(running.iter().all(|t| t.status == TaskStatus::Running));

        let page = store
            .list_tasks(&TaskFilter {
                status: Some(TaskStatus::Running),
                limit: 2,
                offset: 2,
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);

        let beyond = store
            .list_tasks(&TaskFilter {
                offset: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_durable_store_replays_and_skips_corrupt_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tasks");

        let t = task("persist me");
        {
            let store = MemoryTaskStore::open(&dir).await.unwrap();
            store.create_task(&t).await.unwrap();
        }
        assert!(dir.join(format!("{}.json", t.id)).exists());

        std::fs::write(dir.join("broken.json"), b"{ not json").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let reopened = MemoryTaskStore::open(&dir).await.unwrap();
        assert_eq!(reopened.count_tasks().await.unwrap(), 1);
        assert_eq!(reopened.get_task(&t.id).await.unwrap(), t);
    }

    #[tokio::test]
    async fn test_durable_delete_removes_file() {
        let temp = TempDir::new().unwrap();
        let store = MemoryTaskStore::open(temp.path()).await.unwrap();

        let t = task("short lived");
        store.create_task(&t).await.unwrap();
        let path = temp.path().join(format!("{}.json", t.id));
        assert!(path.exists());

        store.delete_task(&t.id).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_file_removal_keeps_record() {
        let temp = TempDir::new().unwrap();
        let store = MemoryTaskStore::open(temp.path()).await.unwrap();

        let t = task("stuck on disk");
        store.create_task(&t).await.unwrap();

        // A directory in place of the task file cannot be unlinked
        let path = temp.path().join(format!("{}.json", t.id));
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.delete_task(&t.id).await.is_err());
        assert_eq!(store.get_task(&t.id).await.unwrap().id, t.id);
        assert_eq!(store.count_tasks().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = MemoryTaskStore::open(temp.path().join("absent"))
            .await
            .unwrap();
        assert_eq!(store.count_tasks().await.unwrap(), 0);
    }
}
