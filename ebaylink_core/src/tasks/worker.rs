use crate::config::ConnectorConfig;
use crate::import::traits::ImportOutcome;
use crate::tasks::models::{ImportTask, QueuedTask};
use crate::tasks::traits::TaskQueue;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Executes one deferred import unit.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &ImportTask) -> Result<ImportOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Completed,
    Retried,
    DeadLettered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl WorkerReport {
    fn absorb(&mut self, other: WorkerReport) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Claims due tasks and runs them concurrently, retrying retryable failures with
/// exponential backoff and dead-lettering the rest.
///
/// Each unit is spawned and reports its own result, so dropping a running loop stops
/// claiming but lets in-flight units finish.
pub struct TaskWorker {
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    config: Arc<ConnectorConfig>,
    permits: Arc<Semaphore>,
}

impl TaskWorker {
    #[tracing::instrument(level = "debug", skip(queue, runner))]
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        runner: Arc<dyn TaskRunner>,
        config: ConnectorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            queue,
            runner,
            permits: Arc::new(Semaphore::new(config.worker_concurrency)),
            config: Arc::new(config),
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_once(&self) -> Result<WorkerReport> {
        let claimed = self
            .queue
            .claim(Utc::now(), self.config.worker_concurrency)
            .await?;
        let mut report = WorkerReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(claimed.len());
        for queued in claimed {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::backend("worker semaphore closed", e))?;
            let queue = self.queue.clone();
            let runner = self.runner.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = runner.run(&queued.task).await;
                settle(queue.as_ref(), &config, queued, result).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(Settled::Completed)) => report.completed += 1,
                Ok(Ok(Settled::Retried)) => report.retried += 1,
                Ok(Ok(Settled::DeadLettered)) => report.dead_lettered += 1,
                Ok(Err(e)) => tracing::error!(error = %e, "failed to record task result"),
                Err(e) => tracing::error!(error = %e, "task unit panicked"),
            }
        }
        Ok(report)
    }

    /// Run until the queue is empty, waiting out retry backoff.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn drain(&self) -> Result<WorkerReport> {
        let mut total = WorkerReport::default();
        loop {
            let report = self.run_once().await?;
            total.absorb(report);
            if report.claimed == 0 {
                if self.queue.pending().await? == 0 {
                    return Ok(total);
                }
                tokio::time::sleep(Duration::from_millis(self.config.worker_poll_interval_ms))
                    .await;
            }
        }
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run_loop(&self) -> Result<()> {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.worker_poll_interval_ms));
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if report.claimed > 0 => {
                    tracing::info!(
                        claimed = report.claimed,
                        completed = report.completed,
                        retried = report.retried,
                        dead_lettered = report.dead_lettered,
                        "worker pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "worker pass failed"),
            }
        }
    }
}

async fn settle(
    queue: &dyn TaskQueue,
    config: &ConnectorConfig,
    queued: QueuedTask,
    result: Result<ImportOutcome>,
) -> Result<Settled> {
    match result {
        Ok(outcome) => {
            tracing::debug!(task_id = %queued.id, description = %queued.description, action = ?outcome.action, "task done");
            queue.complete(queued.id).await?;
            Ok(Settled::Completed)
        }
        Err(e) if e.is_retryable() && queued.retry_count < config.max_retries => {
            let delay = config.retry_backoff(queued.retry_count);
            let not_before = Utc::now()
                + chrono::Duration::from_std(delay)
                    .map_err(|err| Error::backend("retry backoff out of range", err))?;
            tracing::warn!(
                task_id = %queued.id, description = %queued.description,
                retry_count = queued.retry_count, delay_ms = delay.as_millis() as u64, error = %e,
                "task failed; retrying"
            );
            queue.retry(queued.id, not_before, &e.to_string()).await?;
            Ok(Settled::Retried)
        }
        Err(e) => {
            let reason = if e.is_retryable() {
                format!("retries exhausted after {}: {e}", queued.retry_count)
            } else {
                e.to_string()
            };
            tracing::error!(task_id = %queued.id, description = %queued.description, %reason, "task dead-lettered");
            queue.dead_letter(queued.id, &reason).await?;
            Ok(Settled::DeadLettered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::traits::ImportAction;
    use crate::models::{BackendId, EntityType, ExternalId};
    use crate::tasks::memory::MemoryTaskQueue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CATEGORY: EntityType = EntityType::from_static("ebay.config.product.category");

    /// Fails each external id a scripted number of times before succeeding.
    struct ScriptedRunner {
        retryable_failures: Mutex<HashMap<String, u32>>,
        fatal: Vec<String>,
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &ImportTask) -> Result<ImportOutcome> {
            let id = task.external_id.to_string();
            if self.fatal.contains(&id) {
                return Err(Error::Validation(format!("{id} has no name")));
            }
            {
                let mut left = self.retryable_failures.lock().unwrap();
                if let Some(n) = left.get_mut(&id) {
                    if *n > 0 {
                        *n -= 1;
                        return Err(Error::Unavailable("429".into()));
                    }
                }
            }
            Ok(ImportOutcome {
                entity_type: task.entity_type.clone(),
                external_id: task.external_id.clone(),
                action: ImportAction::Created,
                internal_id: None,
                warnings: Vec::new(),
                children: Vec::new(),
            })
        }
    }

    fn config(max_retries: u32) -> ConnectorConfig {
        ConnectorConfig {
            max_retries,
            retry_backoff_base_ms: 1,
            retry_backoff_max_ms: 2,
            worker_poll_interval_ms: 1,
            ..Default::default()
        }
    }

    async fn enqueue(queue: &MemoryTaskQueue, ids: &[&str]) {
        let backend = BackendId::new();
        for id in ids {
            queue
                .enqueue(ImportTask::new(backend, CATEGORY, ExternalId::new(*id)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_and_dead_letters_fatal_ones() {
        let queue = MemoryTaskQueue::new();
        enqueue(&queue, &["1", "2", "3"]).await;
        let runner = ScriptedRunner {
            retryable_failures: Mutex::new(HashMap::from([("2".to_string(), 2)])),
            fatal: vec!["3".to_string()],
        };
        let worker =
            TaskWorker::new(Arc::new(queue.clone()), Arc::new(runner), config(5)).unwrap();

        let report = worker.drain().await.unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.retried, 2);
        assert_eq!(report.dead_lettered, 1);

        let dead = queue.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].task.task.external_id.as_str(), "3");
        assert!(dead[0].reason.contains("no name"));
    }

    #[tokio::test]
    async fn exhausted_retries_are_dead_lettered() {
        let queue = MemoryTaskQueue::new();
        enqueue(&queue, &["7"]).await;
        let runner = ScriptedRunner {
            retryable_failures: Mutex::new(HashMap::from([("7".to_string(), 10)])),
            fatal: Vec::new(),
        };
        let worker =
            TaskWorker::new(Arc::new(queue.clone()), Arc::new(runner), config(2)).unwrap();

        let report = worker.drain().await.unwrap();
        assert_eq!(report.retried, 2);
        assert_eq!(report.dead_lettered, 1);
        let dead = queue.dead_letters().await.unwrap();
        assert!(dead[0].reason.starts_with("retries exhausted after 2"));
        assert_eq!(queue.pending().await.unwrap(), 0);
    }
}
