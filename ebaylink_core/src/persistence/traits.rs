use crate::models::{EntityType, FieldValues, InternalId};
use crate::persistence::models::EntityRecord;
use crate::Result;
use async_trait::async_trait;

/// Host persistence layer for internal entities.
///
/// Each call is one transaction: a created entity is fully written before it is returned.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create(&self, entity_type: &EntityType, fields: FieldValues) -> Result<EntityRecord>;

    /// Merge `fields` into an existing entity. `NotFound` when the entity does not exist.
    async fn update(
        &self,
        entity_type: &EntityType,
        id: InternalId,
        fields: FieldValues,
    ) -> Result<EntityRecord>;

    async fn get(&self, entity_type: &EntityType, id: InternalId) -> Result<Option<EntityRecord>>;

    /// Returns whether an entity was removed.
    async fn delete(&self, entity_type: &EntityType, id: InternalId) -> Result<bool>;

    /// Entities whose top-level `field` equals `value`, oldest first.
    async fn search(
        &self,
        entity_type: &EntityType,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<EntityRecord>>;
}
