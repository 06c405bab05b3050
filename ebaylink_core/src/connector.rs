//! Public surface of the connector: one façade over every store, scoped per backend.

use crate::backend::models::BackendConfig;
use crate::backend::traits::BackendStore;
use crate::binding::traits::BindingStore;
use crate::config::ConnectorConfig;
use crate::export::{ExportOutcome, RecordExporter};
use crate::import::batch::{BatchImporter, BatchReport};
use crate::import::engine::RecordImporter;
use crate::import::locks::KeyLocks;
use crate::import::registry::Registry;
use crate::import::traits::ImportOutcome;
use crate::models::{BackendId, EntityType, ExternalId, Filters, InternalId};
use crate::persistence::traits::EntityStore;
use crate::tasks::models::ImportTask;
use crate::tasks::traits::TaskQueue;
use crate::tasks::worker::{TaskRunner, TaskWorker};
use crate::transport::traits::{Transport, TransportFactory};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Storage and transport collaborators the connector runs against.
#[derive(Clone)]
pub struct ConnectorDeps {
    pub backends: Arc<dyn BackendStore>,
    pub bindings: Arc<dyn BindingStore>,
    pub entities: Arc<dyn EntityStore>,
    pub tasks: Arc<dyn TaskQueue>,
    pub transports: Arc<dyn TransportFactory>,
}

impl ConnectorDeps {
    pub fn new(
        backends: Arc<dyn BackendStore>,
        bindings: Arc<dyn BindingStore>,
        entities: Arc<dyn EntityStore>,
        tasks: Arc<dyn TaskQueue>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            backends,
            bindings,
            entities,
            tasks,
            transports,
        }
    }
}

#[derive(Clone)]
pub struct Connector {
    deps: ConnectorDeps,
    registry: Arc<Registry>,
    config: ConnectorConfig,
    locks: KeyLocks,
}

impl Connector {
    #[tracing::instrument(level = "debug", skip(deps, registry))]
    pub fn new(deps: ConnectorDeps, registry: Registry, config: ConnectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            deps,
            registry: Arc::new(registry),
            config,
            locks: KeyLocks::new(),
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn backends(&self) -> &Arc<dyn BackendStore> {
        &self.deps.backends
    }

    pub fn tasks(&self) -> &Arc<dyn TaskQueue> {
        &self.deps.tasks
    }

    /// Open a transport session for `backend_id`. Everything done through the
    /// returned context shares that session; it closes when the context drops.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn work_on(&self, backend_id: BackendId) -> Result<WorkContext> {
        let backend = self
            .deps
            .backends
            .get(backend_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backend {backend_id}")))?;
        if !backend.enabled {
            return Err(Error::InvalidInput(format!(
                "backend {backend_id} is disabled"
            )));
        }
        let backend = Arc::new(backend);
        let transport = self.deps.transports.open(&backend).await?;

        let importer = RecordImporter::new(
            backend.clone(),
            transport.clone(),
            self.deps.entities.clone(),
            self.registry.clone(),
            self.deps.bindings.clone(),
            self.locks.clone(),
        );
        let exporter = RecordExporter::new(
            backend.clone(),
            transport.clone(),
            self.deps.entities.clone(),
            self.registry.clone(),
            self.deps.bindings.clone(),
            self.locks.clone(),
        );
        let batch = BatchImporter::new(
            importer.clone(),
            self.deps.tasks.clone(),
            self.config.batch_mode,
        );
        tracing::debug!(backend = %backend.id, "work context opened");
        Ok(WorkContext {
            backend,
            transport,
            importer,
            exporter,
            batch,
            opened_at: Instant::now(),
        })
    }

    /// Store a newly created backend, then pull its `initial` catalog.
    /// A failed pull is logged and returns `None`; the backend stays stored.
    #[tracing::instrument(level = "info", skip(self, backend), fields(backend = %backend.id))]
    pub async fn create_backend(
        &self,
        backend: &BackendConfig,
        initial: &EntityType,
    ) -> Result<Option<BatchReport>> {
        self.deps.backends.upsert(backend).await?;
        if !backend.enabled {
            return Ok(None);
        }
        match self.import_batch(backend.id, initial, Filters::new()).await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::warn!(%initial, error = %e, "initial import failed");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(level = "info", skip(self, filters))]
    pub async fn import_batch(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        filters: Filters,
    ) -> Result<BatchReport> {
        let cx = self.work_on(backend_id).await?;
        cx.batch().run(entity_type, filters).await
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn import_record(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
        force: bool,
    ) -> Result<ImportOutcome> {
        let cx = self.work_on(backend_id).await?;
        cx.importer().import(entity_type, external_id, None, force).await
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn export_record(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        internal_id: InternalId,
        fields: Option<Vec<String>>,
    ) -> Result<ExportOutcome> {
        let cx = self.work_on(backend_id).await?;
        cx.exporter()
            .export(entity_type, internal_id, fields.as_deref())
            .await
    }

    /// Worker that drains this connector's task queue.
    pub fn worker(self: &Arc<Self>) -> Result<TaskWorker> {
        TaskWorker::new(
            self.deps.tasks.clone(),
            self.clone(),
            self.config.clone(),
        )
    }
}

#[async_trait]
impl TaskRunner for Connector {
    async fn run(&self, task: &ImportTask) -> Result<ImportOutcome> {
        let cx = self.work_on(task.backend_id).await?;
        cx.importer()
            .import(
                &task.entity_type,
                &task.external_id,
                task.record.clone(),
                task.force,
            )
            .await
    }
}

/// One backend's transport session plus the importers bound to it.
pub struct WorkContext {
    backend: Arc<BackendConfig>,
    transport: Arc<dyn Transport>,
    importer: RecordImporter,
    exporter: RecordExporter,
    batch: BatchImporter,
    opened_at: Instant,
}

impl WorkContext {
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn importer(&self) -> &RecordImporter {
        &self.importer
    }

    pub fn exporter(&self) -> &RecordExporter {
        &self.exporter
    }

    pub fn batch(&self) -> &BatchImporter {
        &self.batch
    }
}

impl Drop for WorkContext {
    fn drop(&mut self) {
        tracing::debug!(
            backend = %self.backend.id,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "work context released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackendStore;
    use crate::backend::models::test_backend;
    use crate::binding::memory::MemoryBindingStore;
    use crate::config::BatchMode;
    use crate::import::engine::test_support::{registry, CUSTOMER, ORDER};
    use crate::import::traits::ImportAction;
    use crate::persistence::memory::MemoryEntityStore;
    use crate::record::ExternalRecord;
    use crate::tasks::memory::MemoryTaskQueue;
    use crate::transport::memory::{InjectedFailure, MemoryTransport, MemoryTransportFactory};
    use serde_json::json;

    struct Harness {
        connector: Arc<Connector>,
        factory: MemoryTransportFactory,
        entities: MemoryEntityStore,
        queue: MemoryTaskQueue,
        backend: BackendConfig,
    }

    async fn harness(batch_mode: BatchMode) -> Harness {
        let factory = MemoryTransportFactory::new(MemoryTransport::new());
        let entities = MemoryEntityStore::new();
        let queue = MemoryTaskQueue::new();
        let backends = MemoryBackendStore::new();
        let backend = test_backend();
        backends.upsert(&backend).await.unwrap();
        let deps = ConnectorDeps::new(
            Arc::new(backends),
            Arc::new(MemoryBindingStore::new()),
            Arc::new(entities.clone()),
            Arc::new(queue.clone()),
            Arc::new(factory.clone()),
        );
        let config = ConnectorConfig {
            batch_mode,
            retry_backoff_base_ms: 1,
            retry_backoff_max_ms: 2,
            worker_poll_interval_ms: 1,
            ..Default::default()
        };
        Harness {
            connector: Arc::new(Connector::new(deps, registry(), config).unwrap()),
            factory,
            entities,
            queue,
            backend,
        }
    }

    fn order(id: &str, email: &str) -> ExternalRecord {
        ExternalRecord::new(json!({
            "order_id": id,
            "total": 12.5,
            "buyer": {"email": email},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn session_is_released_on_success_and_failure() {
        let h = harness(BatchMode::Direct).await;
        let transport = h.factory.transport().clone();
        transport.put(&ORDER, "1", order("1", "a@example.com")).unwrap();
        transport
            .fail_read(&ORDER, "2", InjectedFailure::Connectivity)
            .unwrap();

        let ok = h
            .connector
            .import_record(h.backend.id, &ORDER, &ExternalId::new("1"), false)
            .await
            .unwrap();
        assert_eq!(ok.action, ImportAction::Created);
        assert_eq!(h.factory.open_sessions(), 0);

        let err = h
            .connector
            .import_record(h.backend.id, &ORDER, &ExternalId::new("2"), false)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.factory.open_sessions(), 0);
        assert_eq!(h.factory.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn one_session_serves_a_whole_batch() {
        let h = harness(BatchMode::Direct).await;
        let transport = h.factory.transport().clone();
        for i in 1..=4 {
            transport
                .put(&ORDER, i.to_string(), order(&i.to_string(), "same@example.com"))
                .unwrap();
        }
        let report = h
            .connector
            .import_batch(h.backend.id, &ORDER, Filters::new())
            .await
            .unwrap();
        assert_eq!(report.succeeded, 4);
        assert_eq!(h.factory.sessions_opened(), 1);
        assert_eq!(h.entities.count(&CUSTOMER).await, 1);
    }

    #[tokio::test]
    async fn delayed_batch_is_drained_by_the_worker() {
        let h = harness(BatchMode::Delayed).await;
        let transport = h.factory.transport().clone();
        transport.put(&ORDER, "1", order("1", "a@example.com")).unwrap();
        transport.put(&ORDER, "2", order("2", "b@example.com")).unwrap();

        let report = h
            .connector
            .import_batch(h.backend.id, &ORDER, Filters::new())
            .await
            .unwrap();
        assert_eq!(report.scheduled, 2);
        assert_eq!(h.entities.count(&ORDER).await, 0);

        let worked = h.connector.worker().unwrap().drain().await.unwrap();
        assert_eq!(worked.completed, 2);
        assert_eq!(h.entities.count(&ORDER).await, 2);
        assert!(h.queue.dead_letters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_backend_pulls_its_initial_catalog() {
        let h = harness(BatchMode::Direct).await;
        let transport = h.factory.transport().clone();
        transport.put(&ORDER, "1", order("1", "a@example.com")).unwrap();
        transport.put(&ORDER, "2", order("2", "b@example.com")).unwrap();

        let fresh = test_backend();
        let report = h
            .connector
            .create_backend(&fresh, &ORDER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.entities.count(&ORDER).await, 2);
        assert!(h.connector.backends().get(fresh.id).await.unwrap().is_some());
        assert_eq!(transport.searches().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_initial_pull_keeps_the_backend() {
        let h = harness(BatchMode::Direct).await;
        let transport = h.factory.transport().clone();
        transport
            .fail_search(&ORDER, InjectedFailure::Unavailable)
            .unwrap();

        let fresh = test_backend();
        let report = h.connector.create_backend(&fresh, &ORDER).await.unwrap();
        assert!(report.is_none());
        assert_eq!(h.connector.backends().get(fresh.id).await.unwrap(), Some(fresh));
        assert_eq!(h.factory.open_sessions(), 0);

        let mut disabled = test_backend();
        disabled.enabled = false;
        transport.clear_failures().unwrap();
        assert!(h
            .connector
            .create_backend(&disabled, &ORDER)
            .await
            .unwrap()
            .is_none());
        assert_eq!(transport.searches().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_or_disabled_backend_is_rejected() {
        let h = harness(BatchMode::Direct).await;
        let err = h
            .connector
            .import_record(BackendId::new(), &ORDER, &ExternalId::new("1"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mut disabled = h.backend.clone();
        disabled.enabled = false;
        h.connector.backends().upsert(&disabled).await.unwrap();
        let err = h.connector.work_on(disabled.id).await.err().unwrap();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(h.factory.sessions_opened(), 0);
    }

    #[tokio::test]
    async fn export_without_exporter_is_invalid_input() {
        let h = harness(BatchMode::Direct).await;
        let err = h
            .connector
            .export_record(h.backend.id, &ORDER, InternalId::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(h.factory.open_sessions(), 0);
    }
}
