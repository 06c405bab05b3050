use crate::models::{BackendId, EntityType, ExternalId, InternalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Link between one host entity and one marketplace record, within one backend.
///
/// `(backend_id, entity_type, external_id)` is unique, and a host entity has at most one
/// binding per `(backend_id, entity_type)`. The binding owns the link, not the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub backend_id: BackendId,
    pub entity_type: EntityType,
    pub external_id: ExternalId,
    pub internal_id: InternalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Binding {
    pub fn new(
        backend_id: BackendId,
        entity_type: EntityType,
        external_id: ExternalId,
        internal_id: InternalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            backend_id,
            entity_type,
            external_id,
            internal_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What `bind` does when the external id already maps to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Fail with `Conflict`.
    #[default]
    Strict,
    /// Repoint the existing binding at the new entity.
    Override,
}
