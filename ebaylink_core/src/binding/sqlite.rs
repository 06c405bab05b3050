//! SQLite-backed binding store.
//!
//! Uniqueness is enforced by the table itself so concurrent workers sharing one
//! database file cannot create duplicate bindings.

use crate::binding::models::Binding;
use crate::binding::traits::BindingStore;
use crate::models::{BackendId, EntityType, ExternalId, InternalId};
use crate::sqlite::{apply_schema, parse_ts, parse_uuid};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ebaylink_bindings (
  backend_id TEXT NOT NULL,
  entity_type TEXT NOT NULL,
  external_id TEXT NOT NULL,
  internal_id TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  PRIMARY KEY (backend_id, entity_type, external_id)
);
CREATE UNIQUE INDEX IF NOT EXISTS eb_bindings_internal_idx
  ON ebaylink_bindings(backend_id, entity_type, internal_id);
"#;

const COLUMNS: &str = "backend_id, entity_type, external_id, internal_id, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteBindingStore {
    pool: SqlitePool,
}

impl SqliteBindingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        apply_schema(&self.pool, "sqlite_binding_store", SCHEMA).await
    }

    async fn fetch_one_by_external(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
    ) -> Result<Option<Binding>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ebaylink_bindings \
             WHERE backend_id = ?1 AND entity_type = ?2 AND external_id = ?3"
        ))
        .bind(backend_id.to_string())
        .bind(entity_type.as_str())
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_binding).transpose()
    }

    async fn ensure_internal_free(&self, binding: &Binding) -> Result<()> {
        if let Some(other) = self
            .find_by_internal(binding.backend_id, &binding.entity_type, binding.internal_id)
            .await?
        {
            if other.external_id != binding.external_id {
                return Err(Error::Conflict(format!(
                    "entity {} already bound to '{}'",
                    binding.internal_id, other.external_id
                )));
            }
        }
        Ok(())
    }
}

fn row_to_binding(row: &SqliteRow) -> Result<Binding> {
    let ctx = "sqlite_binding_store";
    let backend_id: String = row.try_get("backend_id")?;
    let entity_type: String = row.try_get("entity_type")?;
    let external_id: String = row.try_get("external_id")?;
    let internal_id: String = row.try_get("internal_id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Binding {
        backend_id: BackendId(parse_uuid(ctx, &backend_id)?),
        entity_type: EntityType::new(entity_type),
        external_id: ExternalId::new(external_id),
        internal_id: InternalId(parse_uuid(ctx, &internal_id)?),
        created_at: parse_ts(ctx, &created_at)?,
        updated_at: parse_ts(ctx, &updated_at)?,
    })
}

#[async_trait]
impl BindingStore for SqliteBindingStore {
    async fn get(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
    ) -> Result<Option<Binding>> {
        self.fetch_one_by_external(backend_id, entity_type, external_id)
            .await
    }

    async fn find_by_internal(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        internal_id: InternalId,
    ) -> Result<Option<Binding>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ebaylink_bindings \
             WHERE backend_id = ?1 AND entity_type = ?2 AND internal_id = ?3"
        ))
        .bind(backend_id.to_string())
        .bind(entity_type.as_str())
        .bind(internal_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_binding).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(entity_type = %binding.entity_type, external_id = %binding.external_id))]
    async fn insert(&self, binding: Binding) -> Result<Binding> {
        // The unique index on internal_id surfaces as Conflict via From<sqlx::Error>.
        let res = sqlx::query(
            r#"
INSERT INTO ebaylink_bindings (backend_id, entity_type, external_id, internal_id, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(backend_id, entity_type, external_id) DO NOTHING
"#,
        )
        .bind(binding.backend_id.to_string())
        .bind(binding.entity_type.as_str())
        .bind(binding.external_id.as_str())
        .bind(binding.internal_id.to_string())
        .bind(binding.created_at.to_rfc3339())
        .bind(binding.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 1 {
            return Ok(binding);
        }
        let existing = self
            .fetch_one_by_external(binding.backend_id, &binding.entity_type, &binding.external_id)
            .await?
            .ok_or_else(|| {
                Error::BackendMessage("binding vanished after insert conflict".to_string())
            })?;
        if existing.internal_id == binding.internal_id {
            Ok(existing)
        } else {
            Err(Error::Conflict(format!(
                "already bound to {}",
                existing.internal_id
            )))
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(entity_type = %binding.entity_type, external_id = %binding.external_id))]
    async fn upsert(&self, binding: Binding) -> Result<Binding> {
        self.ensure_internal_free(&binding).await?;
        sqlx::query(
            r#"
INSERT INTO ebaylink_bindings (backend_id, entity_type, external_id, internal_id, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(backend_id, entity_type, external_id) DO UPDATE SET
  internal_id = excluded.internal_id,
  updated_at = excluded.updated_at
"#,
        )
        .bind(binding.backend_id.to_string())
        .bind(binding.entity_type.as_str())
        .bind(binding.external_id.as_str())
        .bind(binding.internal_id.to_string())
        .bind(binding.created_at.to_rfc3339())
        .bind(binding.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.fetch_one_by_external(binding.backend_id, &binding.entity_type, &binding.external_id)
            .await?
            .ok_or_else(|| Error::BackendMessage("binding missing after upsert".to_string()))
    }

    async fn list(&self, backend_id: BackendId, entity_type: &EntityType) -> Result<Vec<Binding>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM ebaylink_bindings \
             WHERE backend_id = ?1 AND entity_type = ?2 ORDER BY external_id"
        ))
        .bind(backend_id.to_string())
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_binding).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ORDER: EntityType = EntityType::from_static("ebay.sale.order");

    async fn store() -> (tempfile::TempDir, SqliteBindingStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::sqlite::open_pool(dir.path().join("bindings.db"))
            .await
            .unwrap();
        let store = SqliteBindingStore::new(pool);
        store.migrate().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn zero_external_id_round_trips_and_conflicts_are_rejected() {
        let (_dir, store) = store().await;
        let backend = BackendId::new();
        let a = InternalId::new();
        let zero = ExternalId::new("0");

        store
            .insert(Binding::new(backend, ORDER, zero.clone(), a, Utc::now()))
            .await
            .unwrap();
        let got = store.get(backend, &ORDER, &zero).await.unwrap().unwrap();
        assert_eq!(got.internal_id, a);
        assert_eq!(got.external_id.as_str(), "0");

        let err = store
            .insert(Binding::new(
                backend,
                ORDER,
                zero.clone(),
                InternalId::new(),
                Utc::now(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
        assert_eq!(
            store.get(backend, &ORDER, &zero).await.unwrap().unwrap().internal_id,
            a
        );

        let err = store
            .insert(Binding::new(backend, ORDER, ExternalId::new("1"), a, Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn upsert_repoints_and_frees_old_entity() {
        let (_dir, store) = store().await;
        let backend = BackendId::new();
        let ext = ExternalId::new("42");
        let (a, b) = (InternalId::new(), InternalId::new());
        store
            .insert(Binding::new(backend, ORDER, ext.clone(), a, Utc::now()))
            .await
            .unwrap();
        let repointed = store
            .upsert(Binding::new(backend, ORDER, ext.clone(), b, Utc::now()))
            .await
            .unwrap();
        assert_eq!(repointed.internal_id, b);
        assert!(store
            .find_by_internal(backend, &ORDER, a)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.list(backend, &ORDER).await.unwrap().len(), 1);
    }
}
