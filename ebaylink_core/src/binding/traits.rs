use crate::binding::models::Binding;
use crate::models::{BackendId, EntityType, ExternalId, InternalId};
use crate::Result;
use async_trait::async_trait;

/// Persistent store of bindings.
///
/// Implementations must make `insert` and `upsert` atomic with respect to the
/// uniqueness rules documented on [`Binding`].
#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn get(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
    ) -> Result<Option<Binding>>;

    async fn find_by_internal(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        internal_id: InternalId,
    ) -> Result<Option<Binding>>;

    /// Insert a new binding.
    ///
    /// Returns the stored binding when an identical link already exists; fails with
    /// `Conflict` when the external id is bound to a different entity or the entity is
    /// already bound to a different external id.
    async fn insert(&self, binding: Binding) -> Result<Binding>;

    /// Insert, or repoint an existing binding for the same external id.
    ///
    /// Still fails with `Conflict` when the target entity is bound to another external id.
    async fn upsert(&self, binding: Binding) -> Result<Binding>;

    async fn list(&self, backend_id: BackendId, entity_type: &EntityType) -> Result<Vec<Binding>>;
}
