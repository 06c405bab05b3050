use crate::models::{BackendId, EntityType, ExternalId};
use crate::record::ExternalRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One deferred record import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTask {
    pub backend_id: BackendId,
    pub entity_type: EntityType,
    pub external_id: ExternalId,
    /// Record already returned by the list call, if any.
    pub record: Option<ExternalRecord>,
    pub force: bool,
}

impl ImportTask {
    pub fn new(backend_id: BackendId, entity_type: EntityType, external_id: ExternalId) -> Self {
        Self {
            backend_id,
            entity_type,
            external_id,
            record: None,
            force: false,
        }
    }

    pub fn with_record(mut self, record: Option<ExternalRecord>) -> Self {
        self.record = record;
        self
    }

    /// Operator-facing label, e.g. `ebay.sale.order.import_record: 123`.
    pub fn description(&self) -> String {
        format!("{}.import_record: {}", self.entity_type, self.external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    DeadLettered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: TaskId,
    pub task: ImportTask,
    pub description: String,
    pub status: TaskStatus,
    pub retry_count: u32,
    /// Not claimable before this instant (retry backoff).
    pub not_before: DateTime<Utc>,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(task: ImportTask, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            description: task.description(),
            task,
            status: TaskStatus::Pending,
            retry_count: 0,
            not_before: now,
            last_error: None,
            enqueued_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.not_before <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: QueuedTask,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}
