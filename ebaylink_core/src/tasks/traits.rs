use crate::tasks::models::{DeadLetter, ImportTask, QueuedTask, TaskId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Queue of deferred import units.
///
/// `claim` hands a task to exactly one worker; the worker then reports back with
/// `complete`, `retry` or `dead_letter`.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: ImportTask) -> Result<TaskId>;

    /// Claim up to `max` due tasks, oldest first, marking them running.
    async fn claim(&self, now: DateTime<Utc>, max: usize) -> Result<Vec<QueuedTask>>;

    async fn complete(&self, id: TaskId) -> Result<()>;

    /// Put a claimed task back, claimable again at `not_before`.
    async fn retry(&self, id: TaskId, not_before: DateTime<Utc>, error: &str) -> Result<()>;

    async fn dead_letter(&self, id: TaskId, reason: &str) -> Result<()>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;

    /// Tasks not yet finished (pending or running).
    async fn pending(&self) -> Result<usize>;
}
