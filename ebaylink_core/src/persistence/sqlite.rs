//! SQLite-backed entity store: one `host_entities` table with the fields as JSON.

use crate::models::{EntityType, FieldValues, InternalId};
use crate::persistence::models::EntityRecord;
use crate::persistence::traits::EntityStore;
use crate::sqlite::{apply_schema, parse_ts, parse_uuid};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS host_entities (
  id TEXT PRIMARY KEY,
  entity_type TEXT NOT NULL,
  fields_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS host_entities_type_idx ON host_entities(entity_type, created_at)
"#;

#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        apply_schema(&self.pool, "sqlite_entity_store", SCHEMA).await
    }
}

fn row_to_record(row: &SqliteRow) -> Result<EntityRecord> {
    let ctx = "sqlite_entity_store";
    let id: String = row.try_get("id")?;
    let entity_type: String = row.try_get("entity_type")?;
    let fields_json: String = row.try_get("fields_json")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(EntityRecord {
        id: InternalId(parse_uuid(ctx, &id)?),
        entity_type: EntityType::new(entity_type),
        fields: serde_json::from_str(&fields_json)
            .map_err(|e| Error::backend("deserialize entity fields", e))?,
        created_at: parse_ts(ctx, &created_at)?,
        updated_at: parse_ts(ctx, &updated_at)?,
    })
}

fn encode(fields: &FieldValues) -> Result<String> {
    serde_json::to_string(fields).map_err(|e| Error::backend("serialize entity fields", e))
}

/// JSON path for a top-level field. Field names come from mapping rules, not operators,
/// but are still restricted to identifier characters.
fn field_path(field: &str) -> Result<String> {
    let ok = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !ok {
        return Err(Error::InvalidInput(format!(
            "invalid search field '{field}'"
        )));
    }
    Ok(format!("$.{field}"))
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    #[tracing::instrument(level = "debug", skip(self, fields))]
    async fn create(&self, entity_type: &EntityType, fields: FieldValues) -> Result<EntityRecord> {
        let record = EntityRecord::new(entity_type.clone(), fields, Utc::now());
        sqlx::query(
            "INSERT INTO host_entities (id, entity_type, fields_json, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(record.id.to_string())
        .bind(entity_type.as_str())
        .bind(encode(&record.fields)?)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(level = "debug", skip(self, fields))]
    async fn update(
        &self,
        entity_type: &EntityType,
        id: InternalId,
        fields: FieldValues,
    ) -> Result<EntityRecord> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, entity_type, fields_json, created_at, updated_at \
             FROM host_entities WHERE id = ?1 AND entity_type = ?2",
        )
        .bind(id.to_string())
        .bind(entity_type.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let mut record = match row {
            Some(r) => row_to_record(&r)?,
            None => return Err(Error::NotFound(format!("{entity_type} {id}"))),
        };
        record.merge(fields, Utc::now());
        sqlx::query("UPDATE host_entities SET fields_json = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(encode(&record.fields)?)
            .bind(record.updated_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn get(&self, entity_type: &EntityType, id: InternalId) -> Result<Option<EntityRecord>> {
        let row = sqlx::query(
            "SELECT id, entity_type, fields_json, created_at, updated_at \
             FROM host_entities WHERE id = ?1 AND entity_type = ?2",
        )
        .bind(id.to_string())
        .bind(entity_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn delete(&self, entity_type: &EntityType, id: InternalId) -> Result<bool> {
        let res = sqlx::query("DELETE FROM host_entities WHERE id = ?1 AND entity_type = ?2")
            .bind(id.to_string())
            .bind(entity_type.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn search(
        &self,
        entity_type: &EntityType,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<EntityRecord>> {
        let path = field_path(field)?;
        let value_json =
            serde_json::to_string(value).map_err(|e| Error::backend("serialize search value", e))?;
        let rows = sqlx::query(
            "SELECT id, entity_type, fields_json, created_at, updated_at FROM host_entities \
             WHERE entity_type = ?1 AND json_extract(fields_json, ?2) = json_extract(?3, '$') \
             ORDER BY created_at",
        )
        .bind(entity_type.as_str())
        .bind(path)
        .bind(value_json)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}
