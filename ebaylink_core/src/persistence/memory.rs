use crate::models::{EntityType, FieldValues, InternalId};
use crate::persistence::models::EntityRecord;
use crate::persistence::traits::EntityStore;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory entity store for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryEntityStore {
    entities: Arc<RwLock<HashMap<(EntityType, InternalId), EntityRecord>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create/update calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn count(&self, entity_type: &EntityType) -> usize {
        self.entities
            .read()
            .await
            .keys()
            .filter(|(t, _)| t == entity_type)
            .count()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn create(&self, entity_type: &EntityType, fields: FieldValues) -> Result<EntityRecord> {
        let record = EntityRecord::new(entity_type.clone(), fields, Utc::now());
        self.entities
            .write()
            .await
            .insert((entity_type.clone(), record.id), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        id: InternalId,
        fields: FieldValues,
    ) -> Result<EntityRecord> {
        let mut entities = self.entities.write().await;
        let record = entities
            .get_mut(&(entity_type.clone(), id))
            .ok_or_else(|| Error::NotFound(format!("{entity_type} {id}")))?;
        record.merge(fields, Utc::now());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn get(&self, entity_type: &EntityType, id: InternalId) -> Result<Option<EntityRecord>> {
        Ok(self
            .entities
            .read()
            .await
            .get(&(entity_type.clone(), id))
            .cloned())
    }

    async fn delete(&self, entity_type: &EntityType, id: InternalId) -> Result<bool> {
        Ok(self
            .entities
            .write()
            .await
            .remove(&(entity_type.clone(), id))
            .is_some())
    }

    async fn search(
        &self,
        entity_type: &EntityType,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<EntityRecord>> {
        let mut out: Vec<EntityRecord> = self
            .entities
            .read()
            .await
            .values()
            .filter(|r| &r.entity_type == entity_type && r.fields.get(field) == Some(value))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}
