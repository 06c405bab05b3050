use crate::backend::models::BackendConfig;
use crate::models::BackendId;
use crate::Result;
use async_trait::async_trait;

/// Durable storage for backend configurations.
#[async_trait]
pub trait BackendStore: Send + Sync {
    async fn get(&self, id: BackendId) -> Result<Option<BackendConfig>>;

    /// Insert or replace by id.
    async fn upsert(&self, backend: &BackendConfig) -> Result<()>;

    /// All backends, ordered by name.
    async fn list(&self) -> Result<Vec<BackendConfig>>;
}
