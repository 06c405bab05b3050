use crate::backend::models::BackendConfig;
use crate::backend::traits::BackendStore;
use crate::models::BackendId;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory backend store for local development and unit tests.
#[derive(Clone, Default)]
pub struct MemoryBackendStore {
    backends: Arc<RwLock<HashMap<BackendId, BackendConfig>>>,
}

impl MemoryBackendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackendStore for MemoryBackendStore {
    async fn get(&self, id: BackendId) -> Result<Option<BackendConfig>> {
        Ok(self.backends.read().await.get(&id).cloned())
    }

    async fn upsert(&self, backend: &BackendConfig) -> Result<()> {
        backend.validate()?;
        self.backends
            .write()
            .await
            .insert(backend.id, backend.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BackendConfig>> {
        let mut out: Vec<BackendConfig> = self.backends.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
