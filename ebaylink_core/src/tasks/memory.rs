use crate::tasks::models::{DeadLetter, ImportTask, QueuedTask, TaskId, TaskStatus};
use crate::tasks::traits::TaskQueue;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    // Enqueue order.
    tasks: Vec<QueuedTask>,
    dead: Vec<DeadLetter>,
}

impl Inner {
    fn running_mut(&mut self, id: TaskId) -> Result<&mut QueuedTask> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if task.status != TaskStatus::Running {
            return Err(Error::Conflict(format!(
                "task {id} is {:?}, not running",
                task.status
            )));
        }
        Ok(task)
    }
}

/// In-process task queue. Finished tasks are dropped; dead letters are kept.
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<QueuedTask> {
        self.inner.lock().await.tasks.clone()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: ImportTask) -> Result<TaskId> {
        let queued = QueuedTask::new(task, Utc::now());
        let id = queued.id;
        tracing::debug!(task_id = %id, description = %queued.description, "task enqueued");
        self.inner.lock().await.tasks.push(queued);
        Ok(id)
    }

    async fn claim(&self, now: DateTime<Utc>, max: usize) -> Result<Vec<QueuedTask>> {
        let mut inner = self.inner.lock().await;
        let mut out = Vec::new();
        for task in inner.tasks.iter_mut() {
            if out.len() >= max {
                break;
            }
            if task.is_due(now) {
                task.status = TaskStatus::Running;
                out.push(task.clone());
            }
        }
        Ok(out)
    }

    async fn complete(&self, id: TaskId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.running_mut(id)?.status = TaskStatus::Done;
        inner.tasks.retain(|t| t.id != id);
        Ok(())
    }

    async fn retry(&self, id: TaskId, not_before: DateTime<Utc>, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let task = inner.running_mut(id)?;
        task.status = TaskStatus::Pending;
        task.retry_count += 1;
        task.not_before = not_before;
        task.last_error = Some(error.to_string());
        Ok(())
    }

    async fn dead_letter(&self, id: TaskId, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let task = inner.running_mut(id)?;
        task.status = TaskStatus::DeadLettered;
        task.last_error = Some(reason.to_string());
        let task = task.clone();
        inner.tasks.retain(|t| t.id != id);
        inner.dead.push(DeadLetter {
            task,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.inner.lock().await.dead.clone())
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
            .count())
    }
}
