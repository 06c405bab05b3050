use crate::backend::models::BackendConfig;
use crate::config::BatchMode;
use crate::import::dependency::DependencyEdge;
use crate::mapping::export::ExportMapper;
use crate::mapping::mapper::Mapper;
use crate::models::{EntityType, ExternalId, FieldValues, Filters, InternalId};
use crate::persistence::traits::EntityStore;
use crate::record::ExternalRecord;
use crate::transport::traits::Transport;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Collaborators available to entity hooks during one unit of work.
#[derive(Clone, Copy)]
pub struct ImportEnv<'a> {
    pub backend: &'a BackendConfig,
    pub transport: &'a dyn Transport,
    pub entities: &'a dyn EntityStore,
}

/// Record importer states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Fetched,
    SkipChecked,
    DependenciesResolved,
    Mapped,
    Persisted,
    PostProcessed,
}

impl ImportStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::SkipChecked => "skip_checked",
            Self::DependenciesResolved => "dependencies_resolved",
            Self::Mapped => "mapped",
            Self::Persisted => "persisted",
            Self::PostProcessed => "post_processed",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ImportAction {
    Created,
    /// A pre-existing internal entity was found and bound instead of creating one.
    Adopted,
    Updated,
    /// Mapped values matched the stored entity; nothing was written.
    Unchanged,
    Skipped { reason: String },
}

/// A post-import side effect that failed after the entity was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessWarning {
    pub hook: String,
    pub message: String,
}

impl PostProcessWarning {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }

    pub fn from_error(hook: impl Into<String>, err: &Error) -> Self {
        Self::new(hook, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub entity_type: EntityType,
    pub external_id: ExternalId,
    pub action: ImportAction,
    pub internal_id: Option<InternalId>,
    pub warnings: Vec<PostProcessWarning>,
    /// Outcomes of child records imported after this one persisted.
    pub children: Vec<ImportOutcome>,
}

impl ImportOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.action, ImportAction::Skipped { .. })
    }
}

/// A child record imported after its parent persists (order lines, for example).
#[derive(Debug, Clone, PartialEq)]
pub struct ChildImport {
    pub entity_type: EntityType,
    pub external_id: ExternalId,
    pub record: ExternalRecord,
}

/// Import behavior of one binding model.
///
/// Only `entity_type` and `mapper` are mandatory; every other hook has a neutral default.
#[async_trait]
pub trait EntityImporter: Send + Sync {
    /// Binding model name, e.g. `ebay.sale.order`.
    fn entity_type(&self) -> &EntityType;

    /// Host model the binding points at. Defaults to the binding model itself.
    fn host_type(&self) -> &EntityType {
        self.entity_type()
    }

    fn mapper(&self) -> &dyn Mapper;

    fn dependencies(&self) -> &[DependencyEdge] {
        &[]
    }

    /// Pins the batch mode for this entity; `None` uses the connector default.
    fn batch_mode(&self) -> Option<BatchMode> {
        None
    }

    fn batch_filters(&self, filters: Filters) -> Filters {
        filters
    }

    async fn fetch(&self, env: &ImportEnv<'_>, external_id: &ExternalId) -> Result<ExternalRecord> {
        env.transport.read(self.entity_type(), external_id, &[]).await
    }

    /// Reason to skip this record, if any. Skipping is not an error.
    fn must_skip(
        &self,
        _record: &ExternalRecord,
        _existing: Option<InternalId>,
        _force: bool,
    ) -> Option<String> {
        None
    }

    /// Checks run on the mapped values before anything is persisted.
    fn validate(&self, _values: &FieldValues) -> Result<()> {
        Ok(())
    }

    /// Pre-existing host entity to bind instead of creating a new one (create path only).
    async fn find_existing(
        &self,
        _env: &ImportEnv<'_>,
        _values: &FieldValues,
    ) -> Result<Option<InternalId>> {
        Ok(None)
    }

    fn children(&self, _record: &ExternalRecord) -> Result<Vec<ChildImport>> {
        Ok(Vec::new())
    }

    /// Side effects after persistence. Errors are downgraded to warnings by the caller.
    async fn after_import(
        &self,
        _env: &ImportEnv<'_>,
        _record: &ExternalRecord,
        _internal_id: InternalId,
    ) -> Result<Vec<PostProcessWarning>> {
        Ok(Vec::new())
    }
}

/// Export behavior of one binding model.
pub trait EntityExporter: Send + Sync {
    fn entity_type(&self) -> &EntityType;

    fn host_type(&self) -> &EntityType {
        self.entity_type()
    }

    fn mapper(&self) -> &ExportMapper;
}

/// Exporter made only of a field mapping.
#[derive(Debug, Clone)]
pub struct MappedExporter {
    entity_type: EntityType,
    host_type: EntityType,
    mapper: ExportMapper,
}

impl MappedExporter {
    pub fn new(entity_type: EntityType, host_type: EntityType, mapper: ExportMapper) -> Self {
        Self {
            entity_type,
            host_type,
            mapper,
        }
    }
}

impl EntityExporter for MappedExporter {
    fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    fn host_type(&self) -> &EntityType {
        &self.host_type
    }

    fn mapper(&self) -> &ExportMapper {
        &self.mapper
    }
}
