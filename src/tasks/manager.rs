//! Task lifecycle manager
//!
//! Owns every status transition. A created task is persisted as `pending`,
//! then a detached worker moves it through `running` to `completed` or
//! `failed`, pushing each change to the task's subscriber queues.
//!
//! # Ordering
//!
//! Transitions, subscriber attachment and final-event release all run under
//! one manager-wide lock, so a cancel and a worker commit never interleave and
//! no subscriber can attach after a task's final update was emitted.

use super::executor::{panic_message, EchoExecutor, TaskExecutor};
use crate::error::{Result, ShakerError};
use crate::storage::TaskStore;
use crate::types::{
    SendMessageRequest, Task, TaskEvent, TaskFilter, TaskResult, TaskStatus, TaskUpdate,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default queue depth for each task subscriber
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 10;

const CANCELLED_CONTENT: &str = "Task was cancelled";

/// Floor for polling intervals; a zero interval would spin
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<TaskUpdate>,
}

/// Receiving end of one task subscription
///
/// The queue closes once the task's final update has been delivered, or when
/// the subscription is removed with [`TaskManager::unsubscribe`].
pub struct Subscription {
    id: u64,
    task_id: String,
    rx: mpsc::Receiver<TaskUpdate>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Next update, or `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<TaskUpdate> {
        self.rx.recv().await
    }
}

/// Task lifecycle manager
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    subscribers: DashMap<String, Vec<Subscriber>>,
    subscriber_capacity: usize,
    next_subscription: AtomicU64,
    transitions: Mutex<()>,
}

impl TaskManager {
    /// Manager with the echo executor and default queue depth
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            executor: Arc::new(EchoExecutor),
            subscribers: DashMap::new(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            next_subscription: AtomicU64::new(1),
            transitions: Mutex::new(()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Validate, persist a pending task and start its worker
    ///
    /// Returns without waiting on execution.
    pub async fn create_task(self: &Arc<Self>, request: SendMessageRequest) -> Result<Task> {
        let (task, timeout) = self.persist_new(request).await?;
        self.spawn_worker(task.id.clone(), timeout);
        Ok(task)
    }

    /// Like [`create_task`](Self::create_task), with a subscription attached
    /// before the worker starts
    pub async fn create_and_subscribe(
        self: &Arc<Self>,
        request: SendMessageRequest,
    ) -> Result<(Task, Subscription)> {
        let (task, timeout) = self.persist_new(request).await?;
        let subscription = self.attach(&task.id);
        self.spawn_worker(task.id.clone(), timeout);
        Ok((task, subscription))
    }

    async fn persist_new(
        &self,
        request: SendMessageRequest,
    ) -> Result<(Task, Option<Duration>)> {
        request.validate()?;

        let timeout = request.metadata.timeout.map(Duration::from_secs);
        let task = Task::pending(request.message);
        self.store.create_task(&task).await?;

        info!("Created task {}", task.id);
        Ok((task, timeout))
    }

    fn spawn_worker(self: &Arc<Self>, task_id: String, timeout: Option<Duration>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_task(task_id, timeout).await;
        });
    }

    async fn run_task(&self, task_id: String, timeout: Option<Duration>) {
        let task = match self.begin(&task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("Task {} no longer pending, worker exiting", task_id);
                return;
            }
            Err(e) => {
                error!("Failed to start task {}: {}", task_id, e);
                return;
            }
        };

        let outcome = self.execute(&task, timeout).await;

        if let Err(e) = self.finish(&task_id, outcome).await {
            error!("Failed to record outcome of task {}: {}", task_id, e);
        }
    }

    async fn begin(&self, task_id: &str) -> Result<Option<Task>> {
        let _guard = self.transitions.lock().await;

        let mut task = self.store.get_task(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Ok(None);
        }

        task.transition(TaskStatus::Running, Utc::now())?;
        self.store.update_task(&task).await?;
        self.emit(
            task_id,
            TaskUpdate::new(
                TaskEvent::Status,
                json!({ "task_id": task_id, "status": TaskStatus::Running }),
            ),
        );

        Ok(Some(task))
    }

    async fn execute(
        &self,
        task: &Task,
        timeout: Option<Duration>,
    ) -> std::result::Result<TaskResult, String> {
        let call = AssertUnwindSafe(self.executor.execute(task)).catch_unwind();

        let caught = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => {
                    warn!("Task {} timed out after {:?}", task.id, limit);
                    return Err(format!("Task timed out after {}s", limit.as_secs()));
                }
            },
            None => call.await,
        };

        match caught {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!("Task {} failed: {:#}", task.id, e);
                Err(format!("{:#}", e))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Executor panicked on task {}: {}", task.id, message);
                Err(format!("Executor panicked: {}", message))
            }
        }
    }

    async fn finish(
        &self,
        task_id: &str,
        outcome: std::result::Result<TaskResult, String>,
    ) -> Result<()> {
        let _guard = self.transitions.lock().await;

        let mut task = self.store.get_task(task_id).await?;
        if task.is_terminal() {
            info!(
                "Task {} already {}, discarding executor outcome",
                task_id, task.status
            );
            return Ok(());
        }

        let (status, result, event) = match outcome {
            Ok(result) => (TaskStatus::Completed, result, TaskEvent::Completed),
            Err(message) => (TaskStatus::Failed, TaskResult::text(message), TaskEvent::Failed),
        };

        task.result = Some(result);
        task.transition(status, Utc::now())?;
        self.store.update_task(&task).await?;

        info!("Task {} {}", task_id, status);
        self.emit(task_id, TaskUpdate::new(event, serde_json::to_value(&task)?));
        Ok(())
    }

    /// Force a non-terminal task to `failed`
    ///
    /// An executor call already in flight keeps running; its outcome is
    /// discarded when it returns.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let _guard = self.transitions.lock().await;

        let mut task = self.store.get_task(task_id).await?;
        if task.is_terminal() {
            return Err(ShakerError::InvalidState(format!(
                "task {} is already {}",
                task_id, task.status
            )));
        }

        task.result = Some(TaskResult::text(CANCELLED_CONTENT));
        task.transition(TaskStatus::Failed, Utc::now())?;
        self.store.update_task(&task).await?;

        info!("Cancelled task {}", task_id);
        self.emit(
            task_id,
            TaskUpdate::new(TaskEvent::Cancelled, serde_json::to_value(&task)?),
        );
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store.get_task(task_id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    /// Remove a task record and release its subscribers
    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let _guard = self.transitions.lock().await;

        self.store.delete_task(task_id).await?;
        self.subscribers.remove(task_id);
        info!("Deleted task {}", task_id);
        Ok(())
    }

    /// Attach a subscriber queue to an existing task
    ///
    /// Subscribing to a terminal task yields an already-closed queue.
    pub async fn subscribe(&self, task_id: &str) -> Result<Subscription> {
        let _guard = self.transitions.lock().await;

        let task = self.store.get_task(task_id).await?;
        if task.is_terminal() {
            let (_, rx) = mpsc::channel(1);
            return Ok(Subscription {
                id: self.next_subscription.fetch_add(1, Ordering::Relaxed),
                task_id: task_id.to_string(),
                rx,
            });
        }

        Ok(self.attach(task_id))
    }

    fn attach(&self, task_id: &str) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);

        self.subscribers
            .entry(task_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        debug!("Subscription {} attached to task {}", id, task_id);

        Subscription {
            id,
            task_id: task_id.to_string(),
            rx,
        }
    }

    /// Detach a subscriber; unknown IDs are ignored
    pub fn unsubscribe(&self, task_id: &str, subscription_id: u64) {
        let now_empty = match self.subscribers.get_mut(task_id) {
            Some(mut subs) => {
                subs.retain(|sub| sub.id != subscription_id);
                subs.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.subscribers.remove_if(task_id, |_, subs| subs.is_empty());
        }
        debug!("Subscription {} detached from task {}", subscription_id, task_id);
    }

    /// Number of tasks with at least one attached subscriber
    pub fn subscribed_task_count(&self) -> usize {
        self.subscribers.len()
    }

    fn emit(&self, task_id: &str, update: TaskUpdate) {
        if let Some(mut subs) = self.subscribers.get_mut(task_id) {
            subs.retain(|sub| match sub.tx.try_send(update.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Subscriber {} queue full, dropping '{}' for task {}",
                        sub.id, update.event, task_id
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }

        if update.is_final {
            if let Some((_, subs)) = self.subscribers.remove(task_id) {
                debug!(
                    "Released {} subscriptions for task {}",
                    subs.len(),
                    task_id
                );
            }
        }
    }

    /// Poll the store until the task is terminal
    pub async fn wait_for_terminal(
        &self,
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
                    return Err(ShakerError::Cancelled(format!("wait for task {}", task_id)));
                }
                _ = &mut deadline => {
                    return Err(ShakerError::Timeout(format!(
                        "task {} not terminal after {:?}",
                        task_id, timeout
                    )));
                }
                _ = ticker.tick() => {
                    let task = self.store.get_task(task_id).await?;
                    if task.is_terminal() {
                        return Ok(task);
                    }
                }
            }
        }
    }
}
