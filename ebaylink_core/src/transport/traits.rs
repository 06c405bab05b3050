use crate::backend::models::BackendConfig;
use crate::models::{EntityType, ExternalId, FieldValues, Filters};
use crate::record::ExternalRecord;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One result of a transport search.
///
/// Some marketplace list calls return full records; those are carried along so the
/// record importer can skip the read-by-id round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub external_id: ExternalId,
    pub record: Option<ExternalRecord>,
}

impl SearchHit {
    pub fn id_only(external_id: ExternalId) -> Self {
        Self {
            external_id,
            record: None,
        }
    }

    pub fn with_record(external_id: ExternalId, record: ExternalRecord) -> Self {
        Self {
            external_id,
            record: Some(record),
        }
    }
}

/// Remote marketplace operations for one backend session.
///
/// Implementations return `Error::NotFound` for unknown ids and `Error::Connectivity`
/// when the marketplace cannot be reached; the two are never conflated.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn search(&self, entity_type: &EntityType, filters: &Filters) -> Result<Vec<SearchHit>>;

    /// Read one record. An empty `attributes` slice means all attributes.
    async fn read(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        attributes: &[String],
    ) -> Result<ExternalRecord>;

    async fn create(&self, entity_type: &EntityType, data: &FieldValues) -> Result<ExternalId>;

    async fn update(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        data: &FieldValues,
    ) -> Result<()>;

    async fn delete(&self, entity_type: &EntityType, external_id: &ExternalId) -> Result<()>;

    /// Download a binary asset referenced by a record. `None` when the asset is gone.
    async fn fetch_asset(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

/// Opens a transport session for a backend. The session is released when the last
/// handle to it is dropped.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn Transport>>;
}
