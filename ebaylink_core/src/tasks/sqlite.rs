//! SQLite-backed task queue, shared by every process pointed at the same file.

use crate::sqlite::{apply_schema, parse_ts, parse_uuid};
use crate::tasks::models::{DeadLetter, ImportTask, QueuedTask, TaskId, TaskStatus};
use crate::tasks::traits::TaskQueue;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ebaylink_tasks (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  task_json TEXT NOT NULL,
  description TEXT NOT NULL,
  status TEXT NOT NULL,
  retry_count INTEGER NOT NULL DEFAULT 0,
  not_before TEXT NOT NULL,
  last_error TEXT,
  enqueued_at TEXT NOT NULL,
  dead_reason TEXT,
  dead_lettered_at TEXT
);
CREATE INDEX IF NOT EXISTS eb_tasks_due_idx
  ON ebaylink_tasks(status, not_before)
"#;

const COLUMNS: &str = "seq, id, task_json, description, status, retry_count, not_before, \
                       last_error, enqueued_at, dead_reason, dead_lettered_at";

// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Done => "done",
        TaskStatus::DeadLettered => "dead_lettered",
    }
}

fn parse_status(raw: &str) -> Result<TaskStatus> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "running" => Ok(TaskStatus::Running),
        "done" => Ok(TaskStatus::Done),
        "dead_lettered" => Ok(TaskStatus::DeadLettered),
        other => Err(Error::backend(
            "sqlite_task_queue",
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown task status '{other}'"),
            ),
        )),
    }
}

fn row_to_task(row: &SqliteRow) -> Result<(i64, QueuedTask)> {
    let ctx = "sqlite_task_queue";
    let seq: i64 = row.try_get("seq")?;
    let id: String = row.try_get("id")?;
    let task_json: String = row.try_get("task_json")?;
    let status: String = row.try_get("status")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let not_before: String = row.try_get("not_before")?;
    let enqueued_at: String = row.try_get("enqueued_at")?;
    let task: ImportTask = serde_json::from_str(&task_json)
        .map_err(|e| Error::backend("deserialize import task", e))?;
    Ok((
        seq,
        QueuedTask {
            id: TaskId(parse_uuid(ctx, &id)?),
            task,
            description: row.try_get("description")?,
            status: parse_status(&status)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            not_before: parse_ts(ctx, &not_before)?,
            last_error: row.try_get("last_error")?,
            enqueued_at: parse_ts(ctx, &enqueued_at)?,
        },
    ))
}

#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        apply_schema(&self.pool, "sqlite_task_queue", SCHEMA).await
    }

    /// Why a finish call on `id` matched no running row.
    async fn not_running(&self, id: TaskId) -> Error {
        let status = sqlx::query("SELECT status FROM ebaylink_tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await;
        match status {
            Ok(Some(row)) => {
                let status: String = row.try_get("status").unwrap_or_default();
                Error::Conflict(format!("task {id} is {status}, not running"))
            }
            Ok(None) => Error::NotFound(format!("task {id}")),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, task: ImportTask) -> Result<TaskId> {
        let queued = QueuedTask::new(task, Utc::now());
        let task_json = serde_json::to_string(&queued.task)
            .map_err(|e| Error::backend("serialize import task", e))?;
        sqlx::query(
            r#"
INSERT INTO ebaylink_tasks (id, task_json, description, status, retry_count, not_before, enqueued_at)
VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
"#,
        )
        .bind(queued.id.to_string())
        .bind(task_json)
        .bind(&queued.description)
        .bind(status_str(TaskStatus::Pending))
        .bind(ts(queued.not_before))
        .bind(ts(queued.enqueued_at))
        .execute(&self.pool)
        .await?;
        tracing::debug!(task_id = %queued.id, description = %queued.description, "task enqueued");
        Ok(queued.id)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn claim(&self, now: DateTime<Utc>, max: usize) -> Result<Vec<QueuedTask>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        // One statement, so two workers never claim the same row.
        let rows = sqlx::query(&format!(
            "UPDATE ebaylink_tasks SET status = 'running' \
             WHERE seq IN ( \
               SELECT seq FROM ebaylink_tasks \
               WHERE status = 'pending' AND not_before <= ?1 \
               ORDER BY seq LIMIT ?2 \
             ) RETURNING {COLUMNS}"
        ))
        .bind(ts(now))
        .bind(i64::try_from(max).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        let mut claimed = rows.iter().map(row_to_task).collect::<Result<Vec<_>>>()?;
        claimed.sort_by_key(|(seq, _)| *seq);
        Ok(claimed.into_iter().map(|(_, t)| t).collect())
    }

    async fn complete(&self, id: TaskId) -> Result<()> {
        let res = sqlx::query("DELETE FROM ebaylink_tasks WHERE id = ?1 AND status = 'running'")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(self.not_running(id).await);
        }
        Ok(())
    }

    async fn retry(&self, id: TaskId, not_before: DateTime<Utc>, error: &str) -> Result<()> {
        let res = sqlx::query(
            "UPDATE ebaylink_tasks \
             SET status = 'pending', retry_count = retry_count + 1, not_before = ?2, last_error = ?3 \
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id.to_string())
        .bind(ts(not_before))
        .bind(error)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(self.not_running(id).await);
        }
        Ok(())
    }

    async fn dead_letter(&self, id: TaskId, reason: &str) -> Result<()> {
        let res = sqlx::query(
            "UPDATE ebaylink_tasks \
             SET status = 'dead_lettered', last_error = ?2, dead_reason = ?2, dead_lettered_at = ?3 \
             WHERE id = ?1 AND status = 'running'",
        )
        .bind(id.to_string())
        .bind(reason)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(self.not_running(id).await);
        }
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ebaylink_tasks WHERE status = 'dead_lettered' ORDER BY seq"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let (_, task) = row_to_task(row)?;
                let reason: Option<String> = row.try_get("dead_reason")?;
                let at: Option<String> = row.try_get("dead_lettered_at")?;
                Ok(DeadLetter {
                    task,
                    reason: reason.unwrap_or_default(),
                    dead_lettered_at: match at {
                        Some(raw) => parse_ts("sqlite_task_queue", &raw)?,
                        None => Utc::now(),
                    },
                })
            })
            .collect()
    }

    async fn pending(&self) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM ebaylink_tasks WHERE status IN ('pending', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}
