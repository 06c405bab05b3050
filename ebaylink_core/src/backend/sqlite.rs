//! SQLite-backed backend store.

use crate::backend::models::BackendConfig;
use crate::backend::traits::BackendStore;
use crate::models::BackendId;
use crate::sqlite::apply_schema;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ebaylink_backends (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  config_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS eb_backends_name_idx ON ebaylink_backends(name);
"#;

#[derive(Clone)]
pub struct SqliteBackendStore {
    pool: SqlitePool,
}

impl SqliteBackendStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        apply_schema(&self.pool, "sqlite_backend_store", SCHEMA).await
    }
}

fn decode(raw: &str) -> Result<BackendConfig> {
    serde_json::from_str(raw).map_err(|e| Error::backend("deserialize backend config", e))
}

#[async_trait]
impl BackendStore for SqliteBackendStore {
    async fn get(&self, id: BackendId) -> Result<Option<BackendConfig>> {
        let row = sqlx::query("SELECT config_json FROM ebaylink_backends WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode(&r.try_get::<String, _>("config_json")?))
            .transpose()
    }

    async fn upsert(&self, backend: &BackendConfig) -> Result<()> {
        backend.validate()?;
        let json = serde_json::to_string(backend)
            .map_err(|e| Error::backend("serialize backend config", e))?;
        sqlx::query(
            r#"
INSERT INTO ebaylink_backends (id, name, config_json, updated_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(id) DO UPDATE SET
  name = excluded.name,
  config_json = excluded.config_json,
  updated_at = excluded.updated_at
"#,
        )
        .bind(backend.id.to_string())
        .bind(&backend.name)
        .bind(json)
        .bind(backend.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BackendConfig>> {
        let rows = sqlx::query("SELECT config_json FROM ebaylink_backends ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| decode(&r.try_get::<String, _>("config_json")?))
            .collect()
    }
}
