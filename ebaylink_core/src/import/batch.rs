use crate::config::BatchMode;
use crate::import::engine::RecordImporter;
use crate::import::traits::ImportAction;
use crate::models::{EntityType, ExternalId, Filters};
use crate::tasks::models::ImportTask;
use crate::tasks::traits::TaskQueue;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub external_id: ExternalId,
    pub error: String,
    pub retryable: bool,
}

/// Aggregate result of one batch. Individual failures never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub entity_type: EntityType,
    pub mode: BatchMode,
    /// Hits returned by the search.
    pub listed: usize,
    /// Hits handed to the record importer or enqueued.
    pub scheduled: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    fn new(entity_type: EntityType, mode: BatchMode, listed: usize) -> Self {
        Self {
            entity_type,
            mode,
            listed,
            scheduled: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, external_id: ExternalId, err: &crate::Error) {
        self.failed += 1;
        self.failures.push(BatchFailure {
            external_id,
            error: err.to_string(),
            retryable: err.is_retryable(),
        });
    }
}

/// Lists records matching filters and schedules one record import per hit.
pub struct BatchImporter {
    importer: RecordImporter,
    queue: Arc<dyn TaskQueue>,
    default_mode: BatchMode,
}

impl BatchImporter {
    pub fn new(importer: RecordImporter, queue: Arc<dyn TaskQueue>, default_mode: BatchMode) -> Self {
        Self {
            importer,
            queue,
            default_mode,
        }
    }

    /// Only a failing search fails the batch; per-record errors land in the report.
    #[tracing::instrument(level = "info", skip(self, filters), fields(backend = %self.importer.backend().id))]
    pub async fn run(&self, entity_type: &EntityType, filters: Filters) -> Result<BatchReport> {
        let entity = self.importer.registry().importer(entity_type)?;
        let mode = entity.batch_mode().unwrap_or(self.default_mode);
        let filters = entity.batch_filters(filters);

        let hits = self
            .importer
            .env()
            .transport
            .search(entity_type, &filters)
            .await?;
        let mut report = BatchReport::new(entity_type.clone(), mode, hits.len());
        tracing::info!(%entity_type, ?mode, listed = hits.len(), "batch listed");

        for hit in hits {
            match mode {
                BatchMode::Direct => {
                    report.scheduled += 1;
                    match self
                        .importer
                        .import(entity_type, &hit.external_id, hit.record, false)
                        .await
                    {
                        Ok(outcome) if matches!(outcome.action, ImportAction::Skipped { .. }) => {
                            report.skipped += 1
                        }
                        Ok(_) => report.succeeded += 1,
                        Err(e) => {
                            tracing::warn!(%entity_type, external_id = %hit.external_id, error = %e, "record import failed");
                            report.fail(hit.external_id, &e);
                        }
                    }
                }
                BatchMode::Delayed => {
                    let task = ImportTask::new(
                        self.importer.backend().id,
                        entity_type.clone(),
                        hit.external_id.clone(),
                    )
                    .with_record(hit.record);
                    match self.queue.enqueue(task).await {
                        Ok(_) => report.scheduled += 1,
                        Err(e) => {
                            tracing::warn!(%entity_type, external_id = %hit.external_id, error = %e, "enqueue failed");
                            report.fail(hit.external_id, &e);
                        }
                    }
                }
            }
        }

        tracing::info!(
            %entity_type,
            scheduled = report.scheduled,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::models::test_backend;
    use crate::binding::memory::MemoryBindingStore;
    use crate::import::engine::test_support::{registry, ORDER};
    use crate::import::locks::KeyLocks;
    use crate::persistence::memory::MemoryEntityStore;
    use crate::record::ExternalRecord;
    use crate::tasks::memory::MemoryTaskQueue;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;

    fn setup() -> (MemoryTransport, MemoryTaskQueue, MemoryEntityStore, RecordImporter) {
        let transport = MemoryTransport::new();
        let queue = MemoryTaskQueue::new();
        let entities = MemoryEntityStore::new();
        let importer = RecordImporter::new(
            Arc::new(test_backend()),
            Arc::new(transport.clone()),
            Arc::new(entities.clone()),
            Arc::new(registry()),
            Arc::new(MemoryBindingStore::new()),
            KeyLocks::new(),
        );
        (transport, queue, entities, importer)
    }

    fn put_orders(transport: &MemoryTransport, n: usize, bad: usize) {
        for i in 1..=n {
            let total = if i == bad { json!(-1) } else { json!(i) };
            transport
                .put(
                    &ORDER,
                    i.to_string(),
                    ExternalRecord::new(json!({
                        "order_id": i.to_string(),
                        "total": total,
                        "buyer": {"email": format!("b{i}@example.com")},
                    }))
                    .unwrap(),
                )
                .unwrap();
        }
    }

    #[tokio::test]
    async fn one_invalid_record_does_not_stop_the_batch() {
        let (transport, queue, entities, importer) = setup();
        put_orders(&transport, 10, 5);
        let batch = BatchImporter::new(importer, Arc::new(queue), BatchMode::Direct);

        let report = batch.run(&ORDER, Filters::new()).await.unwrap();
        assert_eq!(report.listed, 10);
        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].external_id.as_str(), "5");
        assert!(!report.failures[0].retryable);
        assert_eq!(entities.count(&ORDER).await, 9);
    }

    #[tokio::test]
    async fn delayed_mode_enqueues_one_task_per_hit() {
        let (transport, queue, entities, importer) = setup();
        put_orders(&transport, 3, 0);
        transport.embed_records_in_search(true).unwrap();
        let batch = BatchImporter::new(importer, Arc::new(queue.clone()), BatchMode::Delayed);

        let report = batch.run(&ORDER, Filters::new()).await.unwrap();
        assert_eq!(report.scheduled, 3);
        assert_eq!(report.succeeded, 0);
        assert_eq!(entities.count(&ORDER).await, 0);

        let queued = queue.snapshot().await;
        let labels: Vec<&str> = queued.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "test.order.import_record: 1",
                "test.order.import_record: 2",
                "test.order.import_record: 3"
            ]
        );
        assert!(queued.iter().all(|t| t.task.record.is_some()));
    }

    #[tokio::test]
    async fn unregistered_entity_type_is_rejected() {
        let (_transport, queue, _entities, importer) = setup();
        let batch = BatchImporter::new(importer, Arc::new(queue), BatchMode::Direct);
        let unknown = EntityType::from_static("test.unknown");
        assert!(batch.run(&unknown, Filters::new()).await.is_err());
    }
}
