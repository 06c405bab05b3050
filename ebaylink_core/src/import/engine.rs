use crate::backend::models::BackendConfig;
use crate::binding::binder::Binder;
use crate::binding::models::BindMode;
use crate::binding::traits::BindingStore;
use crate::import::dependency::{ResolvedDependencies, MAX_DEPENDENCY_DEPTH};
use crate::import::locks::KeyLocks;
use crate::import::registry::Registry;
use crate::import::traits::{
    EntityImporter, ImportAction, ImportEnv, ImportOutcome, ImportStage, PostProcessWarning,
};
use crate::mapping::mapper::MapContext;
use crate::models::{EntityType, ExternalId, InternalId};
use crate::persistence::traits::EntityStore;
use crate::record::ExternalRecord;
use crate::transport::traits::Transport;
use crate::{Error, Result};
use async_recursion::async_recursion;
use std::sync::Arc;

type ChainLink = (EntityType, ExternalId);

/// Imports one record end-to-end, running its dependencies in-line first.
///
/// Cheap to clone; one is built per work context.
#[derive(Clone)]
pub struct RecordImporter {
    backend: Arc<BackendConfig>,
    transport: Arc<dyn Transport>,
    entities: Arc<dyn EntityStore>,
    registry: Arc<Registry>,
    bindings: Arc<dyn BindingStore>,
    locks: KeyLocks,
}

impl RecordImporter {
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

    pub fn env(&self) -> ImportEnv<'_> {
        ImportEnv {
            backend: &self.backend,
            transport: self.transport.as_ref(),
            entities: self.entities.as_ref(),
        }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bindings(&self) -> &Arc<dyn BindingStore> {
        &self.bindings
    }

    /// Import `external_id`. `supplied` is the record when a list call already returned it.
    #[tracing::instrument(
        level = "info",
        skip(self, supplied),
        fields(backend = %self.backend.id)
    )]
    pub async fn import(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        supplied: Option<ExternalRecord>,
        force: bool,
    ) -> Result<ImportOutcome> {
        let mut chain = Vec::new();
        self.run_nested(entity_type, external_id, supplied, force, None, &mut chain)
            .await
    }

    #[async_recursion]
    async fn run_nested(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        supplied: Option<ExternalRecord>,
        force: bool,
        parent: Option<InternalId>,
        chain: &mut Vec<ChainLink>,
    ) -> Result<ImportOutcome> {
        // Checked before taking the key lock: a cycle would otherwise wait on itself.
        if chain
            .iter()
            .any(|(t, id)| t == entity_type && id == external_id)
        {
            let path: Vec<String> = chain
                .iter()
                .chain(std::iter::once(&(entity_type.clone(), external_id.clone())))
                .map(|(t, id)| format!("{t}:{id}"))
                .collect();
            return Err(Error::Validation(format!(
                "dependency cycle: {}",
                path.join(" -> ")
            )));
        }
        if chain.len() >= MAX_DEPENDENCY_DEPTH {
            return Err(Error::Validation(format!(
                "dependency chain deeper than {MAX_DEPENDENCY_DEPTH} at {entity_type} '{external_id}'"
            )));
        }

        chain.push((entity_type.clone(), external_id.clone()));
        let res = self
            .run_unit(entity_type, external_id, supplied, force, parent, chain)
            .await;
        chain.pop();
        res
    }

    async fn run_unit(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        supplied: Option<ExternalRecord>,
        force: bool,
        parent: Option<InternalId>,
        chain: &mut Vec<ChainLink>,
    ) -> Result<ImportOutcome> {
        let importer = self.registry.importer(entity_type)?;
        let env = self.env();
        let backend_id = self.backend.id;
        let _guard = self
            .locks
            .acquire(backend_id, entity_type, external_id)
            .await;
        let binder = Binder::new(self.bindings.clone(), entity_type.clone());
        let host_type = importer.host_type().clone();

        let record = match supplied {
            Some(record) => record,
            None => importer.fetch(&env, external_id).await?,
        };
        trace_stage(entity_type, external_id, ImportStage::Fetched);

        let bound = binder.resolve(backend_id, external_id).await?;
        let existing = match bound {
            Some(id) => self.entities.get(&host_type, id).await?,
            None => None,
        };
        let dangling = bound.is_some() && existing.is_none();
        if dangling {
            tracing::warn!(
                %entity_type, %external_id,
                "binding points at a missing entity; it will be recreated"
            );
        }
        let existing_id = existing.as_ref().map(|e| e.id);

        if let Some(reason) = importer.must_skip(&record, existing_id, force) {
            // A unit whose children did not all land is resumed, not skipped.
            let pending = self.unbound_children(importer.as_ref(), &record).await?;
            if pending == 0 {
                tracing::info!(%entity_type, %external_id, %reason, "import skipped");
                return Ok(ImportOutcome {
                    entity_type: entity_type.clone(),
                    external_id: external_id.clone(),
                    action: ImportAction::Skipped { reason },
                    internal_id: existing_id,
                    warnings: Vec::new(),
                    children: Vec::new(),
                });
            }
            tracing::info!(
                %entity_type, %external_id, %reason, pending,
                "skip ignored: children still unbound"
            );
        }
        trace_stage(entity_type, external_id, ImportStage::SkipChecked);

        let dependencies = self
            .resolve_dependencies(importer.as_ref(), &record, chain)
            .await?;
        trace_stage(entity_type, external_id, ImportStage::DependenciesResolved);

        let ctx = MapContext {
            backend: &self.backend,
            entity_type,
            dependencies: &dependencies,
            parent,
        };
        let values = importer.mapper().apply(&record, existing_id, &ctx)?;
        importer.validate(&values)?;
        trace_stage(entity_type, external_id, ImportStage::Mapped);

        let (action, internal_id) = match existing {
            Some(entity) if !entity.differs_from(&values) => (ImportAction::Unchanged, entity.id),
            Some(entity) => {
                self.entities
                    .update(&host_type, entity.id, values)
                    .await?;
                (ImportAction::Updated, entity.id)
            }
            None => {
                let mode = if dangling {
                    BindMode::Override
                } else {
                    BindMode::Strict
                };
                match importer.find_existing(&env, &values).await? {
                    Some(adopted) => {
                        self.entities
                            .update(&host_type, adopted, values)
                            .await?;
                        binder.bind(backend_id, external_id, adopted, mode).await?;
                        (ImportAction::Adopted, adopted)
                    }
                    None => {
                        let created = self.entities.create(&host_type, values).await?;
                        if let Err(e) = binder.bind(backend_id, external_id, created.id, mode).await
                        {
                            // Never leave an unbound entity behind a failed bind.
                            if let Err(del) = self.entities.delete(&host_type, created.id).await
                            {
                                tracing::error!(
                                    %entity_type, %external_id, internal_id = %created.id, error = %del,
                                    "failed to remove entity after bind failure"
                                );
                            }
                            return Err(e);
                        }
                        (ImportAction::Created, created.id)
                    }
                }
            }
        };
        tracing::info!(%entity_type, %external_id, %internal_id, ?action, "record persisted");
        trace_stage(entity_type, external_id, ImportStage::Persisted);

        let mut children = Vec::new();
        for child in importer.children(&record)? {
            let outcome = self
                .run_nested(
                    &child.entity_type,
                    &child.external_id,
                    Some(child.record),
                    force,
                    Some(internal_id),
                    chain,
                )
                .await?;
            children.push(outcome);
        }

        let warnings = match importer.after_import(&env, &record, internal_id).await {
            Ok(w) => w,
            Err(e) => vec![PostProcessWarning::from_error("after_import", &e)],
        };
        for w in &warnings {
            tracing::warn!(%entity_type, %external_id, hook = %w.hook, message = %w.message, "post-process warning");
        }
        trace_stage(entity_type, external_id, ImportStage::PostProcessed);

        Ok(ImportOutcome {
            entity_type: entity_type.clone(),
            external_id: external_id.clone(),
            action,
            internal_id: Some(internal_id),
            warnings,
            children,
        })
    }

    /// Children of `record` with no binding to a live entity.
    async fn unbound_children(
        &self,
        importer: &dyn EntityImporter,
        record: &ExternalRecord,
    ) -> Result<usize> {
        let mut pending = 0;
        for child in importer.children(record)? {
            let host_type = self.registry.importer(&child.entity_type)?.host_type().clone();
            let bound = Binder::new(self.bindings.clone(), child.entity_type.clone())
                .resolve(self.backend.id, &child.external_id)
                .await?;
            let live = match bound {
                Some(id) => self.entities.get(&host_type, id).await?.is_some(),
                None => false,
            };
            if !live {
                pending += 1;
            }
        }
        Ok(pending)
    }

    /// Import every unbound dependency of `record` in-line and collect their internal ids.
    async fn resolve_dependencies(
        &self,
        importer: &dyn EntityImporter,
        record: &ExternalRecord,
        chain: &mut Vec<ChainLink>,
    ) -> Result<ResolvedDependencies> {
        let backend_id = self.backend.id;
        let mut resolved = ResolvedDependencies::default();
        for edge in importer.dependencies() {
            let binder = Binder::new(self.bindings.clone(), edge.entity_type.clone());
            let host_type = self.registry.importer(&edge.entity_type)?.host_type().clone();
            for dep in edge.extract(record)? {
                // A binding whose entity is gone counts as unbound.
                let live = match binder.resolve(backend_id, &dep.external_id).await? {
                    Some(id) => self.entities.get(&host_type, id).await?.map(|e| e.id),
                    None => None,
                };
                let internal_id = match live {
                    Some(id) => id,
                    None => {
                        tracing::debug!(
                            alias = %edge.alias, entity_type = %edge.entity_type, external_id = %dep.external_id,
                            "importing dependency"
                        );
                        let outcome = self
                            .run_nested(
                                &edge.entity_type,
                                &dep.external_id,
                                dep.record,
                                false,
                                None,
                                chain,
                            )
                            .await?;
                        outcome.internal_id.ok_or_else(|| {
                            Error::RetryableJob(format!(
                                "dependency {} '{}' is not ready",
                                edge.entity_type, dep.external_id
                            ))
                        })?
                    }
                };
                resolved.insert(&edge.alias, dep.external_id, internal_id);
            }
        }
        Ok(resolved)
    }
}

fn trace_stage(entity_type: &EntityType, external_id: &ExternalId, stage: ImportStage) {
    tracing::debug!(%entity_type, %external_id, %stage, "import stage");
}
