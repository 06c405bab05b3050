use crate::binding::models::{BindMode, Binding};
use crate::binding::traits::BindingStore;
use crate::models::{BackendId, EntityType, ExternalId, InternalId};
use crate::{Error, Result};
use chrono::Utc;
use std::sync::Arc;

/// Identity binder for one entity type.
#[derive(Clone)]
pub struct Binder {
    store: Arc<dyn BindingStore>,
    entity_type: EntityType,
}

impl Binder {
    pub fn new(store: Arc<dyn BindingStore>, entity_type: EntityType) -> Self {
        Self { store, entity_type }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Internal id bound to `external_id`, if any. No side effects.
    #[tracing::instrument(level = "debug", skip(self), fields(entity_type = %self.entity_type))]
    pub async fn resolve(
        &self,
        backend_id: BackendId,
        external_id: &ExternalId,
    ) -> Result<Option<InternalId>> {
        Ok(self
            .store
            .get(backend_id, &self.entity_type, external_id)
            .await?
            .map(|b| b.internal_id))
    }

    /// External id bound to `internal_id`, if any.
    #[tracing::instrument(level = "debug", skip(self), fields(entity_type = %self.entity_type))]
    pub async fn resolve_external(
        &self,
        backend_id: BackendId,
        internal_id: InternalId,
    ) -> Result<Option<ExternalId>> {
        Ok(self
            .store
            .find_by_internal(backend_id, &self.entity_type, internal_id)
            .await?
            .map(|b| b.external_id))
    }

    /// Create or repoint the binding for `external_id`.
    ///
    /// Binding the same pair twice is a no-op. In `Strict` mode an external id already
    /// bound elsewhere is a `Conflict` and the existing binding is left untouched.
    #[tracing::instrument(level = "debug", skip(self), fields(entity_type = %self.entity_type))]
    pub async fn bind(
        &self,
        backend_id: BackendId,
        external_id: &ExternalId,
        internal_id: InternalId,
        mode: BindMode,
    ) -> Result<Binding> {
        let binding = Binding::new(
            backend_id,
            self.entity_type.clone(),
            external_id.clone(),
            internal_id,
            Utc::now(),
        );
        let stored = match mode {
            BindMode::Strict => self.store.insert(binding).await,
            BindMode::Override => self.store.upsert(binding).await,
        };
        match stored {
            Ok(b) => {
                tracing::debug!(%external_id, %internal_id, "bound");
                Ok(b)
            }
            Err(Error::Conflict(msg)) => Err(Error::Conflict(format!(
                "{} '{}' on backend {}: {}",
                self.entity_type, external_id, backend_id, msg
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::memory::MemoryBindingStore;

    const PARTNER: EntityType = EntityType::from_static("ebay.res.partner");

    fn binder() -> Binder {
        Binder::new(Arc::new(MemoryBindingStore::new()), PARTNER)
    }

    #[tokio::test]
    async fn bind_then_resolve_round_trips_edge_case_ids() {
        let binder = binder();
        let backend = BackendId::new();
        for raw in ["0", "", "123", " padded "] {
            let ext = ExternalId::new(raw);
            let internal = InternalId::new();
            binder
                .bind(backend, &ext, internal, BindMode::Strict)
                .await
                .unwrap();
            assert_eq!(binder.resolve(backend, &ext).await.unwrap(), Some(internal));
            assert_eq!(
                binder.resolve_external(backend, internal).await.unwrap(),
                Some(ext)
            );
        }
        assert_eq!(
            binder
                .resolve(backend, &ExternalId::new("00"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn conflicting_bind_fails_and_keeps_original() {
        let binder = binder();
        let backend = BackendId::new();
        let ext = ExternalId::new("123");
        let a = InternalId::new();
        let b = InternalId::new();

        binder.bind(backend, &ext, a, BindMode::Strict).await.unwrap();
        let err = binder
            .bind(backend, &ext, b, BindMode::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
        assert_eq!(binder.resolve(backend, &ext).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn rebinding_same_pair_is_a_no_op() {
        let binder = binder();
        let backend = BackendId::new();
        let ext = ExternalId::new("7");
        let a = InternalId::new();
        let first = binder.bind(backend, &ext, a, BindMode::Strict).await.unwrap();
        let second = binder.bind(backend, &ext, a, BindMode::Strict).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn override_repoints_binding() {
        let binder = binder();
        let backend = BackendId::new();
        let ext = ExternalId::new("123");
        let a = InternalId::new();
        let b = InternalId::new();
        binder.bind(backend, &ext, a, BindMode::Strict).await.unwrap();
        binder
            .bind(backend, &ext, b, BindMode::Override)
            .await
            .unwrap();
        assert_eq!(binder.resolve(backend, &ext).await.unwrap(), Some(b));
        assert_eq!(binder.resolve_external(backend, a).await.unwrap(), None);
    }

    #[tokio::test]
    async fn bindings_are_scoped_per_backend() {
        let binder = binder();
        let ext = ExternalId::new("123");
        let (b1, b2) = (BackendId::new(), BackendId::new());
        let (a, b) = (InternalId::new(), InternalId::new());
        binder.bind(b1, &ext, a, BindMode::Strict).await.unwrap();
        binder.bind(b2, &ext, b, BindMode::Strict).await.unwrap();
        assert_eq!(binder.resolve(b1, &ext).await.unwrap(), Some(a));
        assert_eq!(binder.resolve(b2, &ext).await.unwrap(), Some(b));
    }
}
