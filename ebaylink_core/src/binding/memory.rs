use crate::binding::models::Binding;
use crate::binding::traits::BindingStore;
use crate::models::{BackendId, EntityType, ExternalId, InternalId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type ForwardKey = (BackendId, EntityType, ExternalId);
type ReverseKey = (BackendId, EntityType, InternalId);

#[derive(Default)]
struct Inner {
    forward: HashMap<ForwardKey, Binding>,
    reverse: HashMap<ReverseKey, ExternalId>,
}

/// In-memory binding store. Both indexes are updated under one lock.
#[derive(Clone, Default)]
pub struct MemoryBindingStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn forward_key(b: &Binding) -> ForwardKey {
    (b.backend_id, b.entity_type.clone(), b.external_id.clone())
}

fn reverse_key(b: &Binding) -> ReverseKey {
    (b.backend_id, b.entity_type.clone(), b.internal_id)
}

impl Inner {
    fn internal_taken_by_other(&self, b: &Binding) -> Option<&ExternalId> {
        self.reverse
            .get(&reverse_key(b))
            .filter(|ext| **ext != b.external_id)
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn get(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
    ) -> Result<Option<Binding>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .forward
            .get(&(backend_id, entity_type.clone(), external_id.clone()))
            .cloned())
    }

    async fn find_by_internal(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        internal_id: InternalId,
    ) -> Result<Option<Binding>> {
        let inner = self.inner.lock().await;
        let Some(ext) = inner
            .reverse
            .get(&(backend_id, entity_type.clone(), internal_id))
        else {
            return Ok(None);
        };
        Ok(inner
            .forward
            .get(&(backend_id, entity_type.clone(), ext.clone()))
            .cloned())
    }

    async fn insert(&self, binding: Binding) -> Result<Binding> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.forward.get(&forward_key(&binding)) {
            if existing.internal_id == binding.internal_id {
                return Ok(existing.clone());
            }
            return Err(Error::Conflict(format!(
                "already bound to {}",
                existing.internal_id
            )));
        }
        if let Some(other) = inner.internal_taken_by_other(&binding) {
            return Err(Error::Conflict(format!(
                "entity {} already bound to '{}'",
                binding.internal_id, other
            )));
        }
        inner
            .reverse
            .insert(reverse_key(&binding), binding.external_id.clone());
        inner.forward.insert(forward_key(&binding), binding.clone());
        Ok(binding)
    }

    async fn upsert(&self, mut binding: Binding) -> Result<Binding> {
        let mut inner = self.inner.lock().await;
        if let Some(other) = inner.internal_taken_by_other(&binding) {
            return Err(Error::Conflict(format!(
                "entity {} already bound to '{}'",
                binding.internal_id, other
            )));
        }
        if let Some(existing) = inner.forward.get(&forward_key(&binding)).cloned() {
            if existing.internal_id == binding.internal_id {
                return Ok(existing);
            }
            inner.reverse.remove(&reverse_key(&existing));
            binding.created_at = existing.created_at;
        }
        inner
            .reverse
            .insert(reverse_key(&binding), binding.external_id.clone());
        inner.forward.insert(forward_key(&binding), binding.clone());
        Ok(binding)
    }

    async fn list(&self, backend_id: BackendId, entity_type: &EntityType) -> Result<Vec<Binding>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Binding> = inner
            .forward
            .values()
            .filter(|b| b.backend_id == backend_id && &b.entity_type == entity_type)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(out)
    }
}
