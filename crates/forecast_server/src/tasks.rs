//! Task Runner — generic async execution substrate.
//!
//! Every long-running computation (the Monte Carlo engine, the portfolio
//! simulator, the MILP solve) is submitted as a job and dispatched to a
//! bounded worker pool. `submit` never blocks; it hands back a `task_id`
//! immediately. Clients poll `status`, optionally `cancel`, and eventually
//! `result`. The pool itself is a `tokio::sync::Semaphore` sized to
//! `WORKER_POOL_SIZE` — acquiring a permit is the FIFO queueing mechanism
//! described here, and the actual CPU-bound work runs inside
//! `spawn_blocking` so it never stalls the async runtime.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, Semaphore};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error("task queue is over capacity ({pending} pending, high-water mark {high_water})")]
    Overloaded { pending: usize, high_water: usize },
    #[error("task not found: {0}")]
    NotFound(Uuid),
    #[error("task panicked: {0}")]
    WorkerPanic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Cancelling,
    Cancelled,
    Succeeded,
    Failed,
}

impl TaskState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Succeeded | TaskState::Failed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: String,
    pub state: TaskState,
    pub progress: u8,
    pub stage: String,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Handed to job closures so they can report progress and observe
/// cancellation without depending on `forecast_server` internals — the
/// same shape `forecast_core::engine::ProgressSink` expects, plus a cancel
/// flag, so a job typically wraps `*self` in a small adapter.
pub struct JobContext {
    id: Uuid,
    registry: Arc<Mutex<HashMap<Uuid, Entry>>>,
    cancel: Arc<AtomicBool>,
}

impl JobContext {
    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Write `{progress, stage}` onto this job's task record. Called from a
    /// blocking worker thread, so this takes a best-effort `try_lock`
    /// rather than blocking on the async mutex — a missed progress update
    /// is harmless, unlike a missed terminal-state transition.
    pub fn report(&self, percent: u8, stage: &str) {
        if let Ok(mut registry) = self.registry.try_lock() {
            if let Some(entry) = registry.get_mut(&self.id) {
                entry.record.progress = percent.min(100);
                entry.record.stage = stage.to_string();
            }
        }
    }
}

impl forecast_core::engine::ProgressSink for JobContext {
    fn report(&self, percent: u8, stage: &str) {
        JobContext::report(self, percent, stage);
    }
}

struct Entry {
    record: TaskRecord,
    cancel: Arc<AtomicBool>,
    done: Arc<Notify>,
}

type Job = Box<dyn FnOnce(&JobContext) -> Result<serde_json::Value, String> + Send>;

pub struct TaskRunner {
    registry: Arc<Mutex<HashMap<Uuid, Entry>>>,
    semaphore: Arc<Semaphore>,
    high_water: usize,
    ttl: Duration,
}

impl TaskRunner {
    pub fn new(pool_size: usize, high_water: usize, ttl: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            high_water,
            ttl,
        }
    }

    /// Enqueue `job` under `kind`. Returns `Overloaded` if the number of
    /// non-terminal tasks already at or above the high-water mark;
    /// never blocks otherwise.
    pub async fn submit<F>(&self, kind: impl Into<String>, job: F) -> Result<Uuid, TaskError>
    where
        F: FnOnce(&JobContext) -> Result<serde_json::Value, String> + Send + 'static,
    {
        let mut registry = self.registry.lock().await;
        let pending = registry.values().filter(|e| !e.record.state.is_terminal()).count();
        if pending >= self.high_water {
            return Err(TaskError::Overloaded {
                pending,
                high_water: self.high_water,
            });
        }

        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(Notify::new());
        registry.insert(
            id,
            Entry {
                record: TaskRecord {
                    id,
                    kind: kind.into(),
                    state: TaskState::Pending,
                    progress: 0,
                    stage: "queued".to_string(),
                    submitted_at: Timestamp::now(),
                    started_at: None,
                    finished_at: None,
                    result: None,
                    error: None,
                },
                cancel: cancel.clone(),
                done: done.clone(),
            },
        );
        drop(registry);

        let registry_handle = self.registry.clone();
        let semaphore = self.semaphore.clone();
        let job: Job = Box::new(job);

        tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");

            {
                let mut registry = registry_handle.lock().await;
                if let Some(entry) = registry.get_mut(&id) {
                    if entry.cancel.load(Ordering::Relaxed) {
                        entry.record.state = TaskState::Cancelled;
                        entry.record.finished_at = Some(Timestamp::now());
                        entry.done.notify_waiters();
                        return;
                    }
                    entry.record.state = TaskState::Running;
                    entry.record.started_at = Some(Timestamp::now());
                }
            }

            let ctx = JobContext {
                id,
                registry: registry_handle.clone(),
                cancel: cancel.clone(),
            };

            let outcome = tokio::task::spawn_blocking(move || {
                catch_unwind(AssertUnwindSafe(|| job(&ctx)))
            })
            .await;

            let mut registry = registry_handle.lock().await;
            if let Some(entry) = registry.get_mut(&id) {
                entry.record.finished_at = Some(Timestamp::now());
                match outcome {
                    Ok(Ok(value)) => {
                        if entry.cancel.load(Ordering::Relaxed) {
                            entry.record.state = TaskState::Cancelled;
                        } else {
                            entry.record.state = TaskState::Succeeded;
                            entry.record.progress = 100;
                            entry.record.result = Some(value);
                        }
                    }
                    Ok(Err(message)) => {
                        entry.record.state = TaskState::Failed;
                        entry.record.error = Some(message);
                    }
                    Err(panic) => {
                        entry.record.state = TaskState::Failed;
                        entry.record.error = Some(panic_message(panic));
                    }
                }
                entry.done.notify_waiters();
            }
        });

        Ok(id)
    }

    pub async fn status(&self, id: Uuid) -> Result<TaskRecord, TaskError> {
        let registry = self.registry.lock().await;
        registry
            .get(&id)
            .map(|e| e.record.clone())
            .ok_or(TaskError::NotFound(id))
    }

    /// Cooperative cancellation: a pending task is cancelled
    /// immediately; a running task moves to `Cancelling` and the worker
    /// observes `cancel_flag()` at its next checkpoint. Idempotent.
    pub async fn cancel(&self, id: Uuid) -> Result<bool, TaskError> {
        let mut registry = self.registry.lock().await;
        let entry = registry.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        entry.cancel.store(true, Ordering::Relaxed);
        match entry.record.state {
            TaskState::Pending => {
                entry.record.state = TaskState::Cancelled;
                entry.record.finished_at = Some(Timestamp::now());
                entry.done.notify_waiters();
                Ok(true)
            }
            TaskState::Running => {
                entry.record.state = TaskState::Cancelling;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// Block up to `timeout` for a terminal state, then return the record
    /// (terminal or not — callers check `record.state`).
    pub async fn result(&self, id: Uuid, timeout: Option<Duration>) -> Result<TaskRecord, TaskError> {
        let done = {
            let registry = self.registry.lock().await;
            let entry = registry.get(&id).ok_or(TaskError::NotFound(id))?;
            if entry.record.state.is_terminal() {
                return Ok(entry.record.clone());
            }
            entry.done.clone()
        };

        match timeout {
            Some(d) => {
                let _ = tokio::time::timeout(d, done.notified()).await;
            }
            None => done.notified().await,
        }

        self.status(id).await
    }

    /// Delete every task whose `finished_at` is older than `ttl`. Run
    /// periodically from a background tick in `main` — tasks are retained
    /// for a bounded TTL after completion, then swept.
    pub async fn sweep(&self) {
        let now_ms = Timestamp::now().as_millisecond();
        let ttl_ms = self.ttl.as_millis() as i64;
        let mut registry = self.registry.lock().await;
        registry.retain(|_, entry| match entry.record.finished_at {
            Some(finished) => (now_ms - finished.as_millisecond()) < ttl_ms,
            None => true,
        });
    }

    pub async fn pending_count(&self) -> usize {
        let registry = self.registry.lock().await;
        registry.values().filter(|e| !e.record.state.is_terminal()).count()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
