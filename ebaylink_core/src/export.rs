//! Push internal entities to the marketplace.

use crate::backend::models::BackendConfig;
use crate::binding::binder::Binder;
use crate::binding::models::BindMode;
use crate::binding::traits::BindingStore;
use crate::import::locks::KeyLocks;
use crate::import::registry::Registry;
use crate::models::{EntityType, ExternalId, InternalId};
use crate::persistence::traits::EntityStore;
use crate::transport::traits::Transport;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub entity_type: EntityType,
    pub internal_id: InternalId,
    pub external_id: ExternalId,
    pub action: ExportAction,
    pub fields: Vec<String>,
}

#[derive(Clone)]
pub struct RecordExporter {
    backend: Arc<BackendConfig>,
    transport: Arc<dyn Transport>,
    entities: Arc<dyn EntityStore>,
    registry: Arc<Registry>,
    bindings: Arc<dyn BindingStore>,
    locks: KeyLocks,
}

impl RecordExporter {
    pub fn new(
        backend: Arc<BackendConfig>,
        transport: Arc<dyn Transport>,
        entities: Arc<dyn EntityStore>,
        registry: Arc<Registry>,
        bindings: Arc<dyn BindingStore>,
        locks: KeyLocks,
    ) -> Self {
        Self {
            backend,
            transport,
            entities,
            registry,
            bindings,
            locks,
        }
    }

    /// Export `internal_id`, restricted to the internal `fields` when given.
    ///
    /// Updates the bound marketplace record, or creates one and binds it.
    #[tracing::instrument(level = "info", skip(self, fields), fields(backend = %self.backend.id))]
    pub async fn export(
        &self,
        entity_type: &EntityType,
        internal_id: InternalId,
        fields: Option<&[String]>,
    ) -> Result<ExportOutcome> {
        let exporter = self.registry.exporter(entity_type)?;
        let entity = self
            .entities
            .get(exporter.host_type(), internal_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("{} {internal_id}", exporter.host_type()))
            })?;
        let data = exporter.mapper().apply(&entity, fields);
        if data.is_empty() {
            return Err(Error::InvalidInput(format!(
                "nothing to export for {entity_type} {internal_id}"
            )));
        }
        let exported: Vec<String> = data.keys().cloned().collect();

        let binder = Binder::new(self.bindings.clone(), entity_type.clone());
        let backend_id = self.backend.id;
        match binder.resolve_external(backend_id, internal_id).await? {
            Some(external_id) => {
                let _guard = self
                    .locks
                    .acquire(backend_id, entity_type, &external_id)
                    .await;
                self.transport
                    .update(entity_type, &external_id, &data)
                    .await?;
                Ok(ExportOutcome {
                    entity_type: entity_type.clone(),
                    internal_id,
                    external_id,
                    action: ExportAction::Updated,
                    fields: exported,
                })
            }
            None => {
                let external_id = self.transport.create(entity_type, &data).await?;
                if let Err(e) = binder
                    .bind(backend_id, &external_id, internal_id, BindMode::Strict)
                    .await
                {
                    if let Err(del) = self.transport.delete(entity_type, &external_id).await {
                        tracing::error!(
                            %entity_type, %external_id, error = %del,
                            "failed to remove remote record after bind failure"
                        );
                    }
                    return Err(e);
                }
                Ok(ExportOutcome {
                    entity_type: entity_type.clone(),
                    internal_id,
                    external_id,
                    action: ExportAction::Created,
                    fields: exported,
                })
            }
        }
    }
}
