//! Shared SQLite pool setup for the single-node stores.

use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Open (creating if missing) a WAL-mode SQLite database at `path`.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<SqlitePool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::backend("sqlite mkdir", e))?;
    }

    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
        .map_err(|e| Error::backend("sqlite connect options", e))?
        .journal_mode(SqliteJournalMode::Wal)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .map_err(|e| Error::backend("sqlite connect", e))
}

/// Apply a multi-statement schema script.
pub(crate) async fn apply_schema(pool: &SqlitePool, context: &str, schema: &str) -> Result<()> {
    for stmt in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|e| Error::backend(format!("{context} schema"), e))?;
    }
    Ok(())
}

pub(crate) fn parse_ts(context: &str, raw: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| Error::backend(format!("{context}: parse timestamp"), e))
}

pub(crate) fn parse_uuid(context: &str, raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|e| Error::backend(format!("{context}: parse uuid"), e))
}
