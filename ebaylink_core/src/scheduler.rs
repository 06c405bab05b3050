//! Periodic sale-order import driven by each backend's stored from-dates.

use crate::backend::models::BackendConfig;
use crate::connector::Connector;
use crate::import::batch::BatchReport;
use crate::models::{BackendId, EntityType, Filters};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Orders created in the last minutes may still be settling on the marketplace.
pub fn sales_window_lag() -> chrono::Duration {
    chrono::Duration::minutes(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SalesWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Window ending `sales_window_lag()` before `now`; an unset or later start collapses to the end.
pub fn sales_window(from: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SalesWindow {
    let to = now - sales_window_lag();
    let from = from.map_or(to, |f| f.min(to));
    SalesWindow { from, to }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesImportKind {
    /// Orders created inside the window.
    Created,
    /// Orders modified inside the window.
    Updated,
}

impl SalesImportKind {
    fn from_date(self, backend: &BackendConfig) -> Option<DateTime<Utc>> {
        match self {
            Self::Created => backend.import_sales_from_date,
            Self::Updated => backend
                .import_updated_sales_from_date
                .or(backend.import_sales_from_date),
        }
    }

    fn filters(self, window: SalesWindow) -> Filters {
        let (from_key, to_key) = match self {
            Self::Created => ("CreateTimeFrom", "CreateTimeTo"),
            Self::Updated => ("ModTimeFrom", "ModTimeTo"),
        };
        let mut filters = Filters::new();
        filters.insert(from_key.to_string(), json!(iso(window.from)));
        filters.insert(to_key.to_string(), json!(iso(window.to)));
        filters
    }

    fn advance(self, backend: &mut BackendConfig, to: DateTime<Utc>) {
        match self {
            Self::Created => backend.import_sales_from_date = Some(to),
            Self::Updated => backend.import_updated_sales_from_date = Some(to),
        }
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct ImportScheduler {
    connector: Arc<Connector>,
    sale_order: EntityType,
    poll_interval: Duration,
}

impl ImportScheduler {
    pub fn new(connector: Arc<Connector>, sale_order: EntityType) -> Self {
        let poll_interval = Duration::from_millis(connector.config().scheduler_poll_interval_ms);
        Self {
            connector,
            sale_order,
            poll_interval,
        }
    }

    /// Import the sales window for one backend, then advance its from-date to the window end.
    ///
    /// The from-date only moves when the batch itself ran; per-order failures are in the report.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn import_sales(
        &self,
        backend_id: BackendId,
        kind: SalesImportKind,
        now: DateTime<Utc>,
    ) -> Result<BatchReport> {
        let backends = self.connector.backends();
        let backend = backends
            .get(backend_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backend {backend_id}")))?;
        let window = sales_window(kind.from_date(&backend), now);
        let report = self
            .connector
            .import_batch(backend_id, &self.sale_order, kind.filters(window))
            .await?;

        // Reload: the batch may have run long and the operator may have edited the backend.
        let mut backend = backends
            .get(backend_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("backend {backend_id}")))?;
        kind.advance(&mut backend, window.to);
        backend.touch(now);
        backends.upsert(&backend).await?;
        tracing::info!(
            backend = %backend_id, ?kind,
            from = %iso(window.from), to = %iso(window.to),
            scheduled = report.scheduled, failed = report.failed,
            "sales window imported"
        );
        Ok(report)
    }

    pub async fn import_sale_orders(&self, backend_id: BackendId) -> Result<BatchReport> {
        self.import_sales(backend_id, SalesImportKind::Created, Utc::now())
            .await
    }

    pub async fn import_updated_sales(&self, backend_id: BackendId) -> Result<BatchReport> {
        self.import_sales(backend_id, SalesImportKind::Updated, Utc::now())
            .await
    }

    /// Import created sales for every enabled backend. Returns how many backends succeeded.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut ok = 0;
        for backend in self.connector.backends().list().await? {
            if !backend.enabled {
                continue;
            }
            match self
                .import_sales(backend.id, SalesImportKind::Created, now)
                .await
            {
                Ok(_) => ok += 1,
                Err(e) => {
                    tracing::warn!(backend = %backend.id, error = %e, "scheduled sales import failed")
                }
            }
        }
        Ok(ok)
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run_loop(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(Utc::now()).await {
                tracing::warn!(error = %e, "scheduler tick failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackendStore;
    use crate::backend::models::test_backend;
    use crate::backend::traits::BackendStore;
    use crate::binding::memory::MemoryBindingStore;
    use crate::config::ConnectorConfig;
    use crate::connector::ConnectorDeps;
    use crate::import::engine::test_support::{registry, ORDER};
    use crate::persistence::memory::MemoryEntityStore;
    use crate::tasks::memory::MemoryTaskQueue;
    use crate::transport::memory::{InjectedFailure, MemoryTransport, MemoryTransportFactory};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn window_ends_two_minutes_before_now() {
        let w = sales_window(None, at(10, 0));
        assert_eq!(w.to, at(9, 58));
        assert_eq!(w.from, w.to);

        let w = sales_window(Some(at(8, 0)), at(10, 0));
        assert_eq!(w.from, at(8, 0));

        let w = sales_window(Some(at(11, 0)), at(10, 0));
        assert_eq!(w.from, w.to);
    }

    async fn scheduler() -> (ImportScheduler, MemoryTransport, Arc<dyn BackendStore>, BackendConfig) {
        let transport = MemoryTransport::new();
        let backends: Arc<dyn BackendStore> = Arc::new(MemoryBackendStore::new());
        let mut backend = test_backend();
        backend.import_sales_from_date = Some(at(6, 0));
        backends.upsert(&backend).await.unwrap();
        let deps = ConnectorDeps::new(
            backends.clone(),
            Arc::new(MemoryBindingStore::new()),
            Arc::new(MemoryEntityStore::new()),
            Arc::new(MemoryTaskQueue::new()),
            Arc::new(MemoryTransportFactory::new(transport.clone())),
        );
        let connector =
            Arc::new(Connector::new(deps, registry(), ConnectorConfig::default()).unwrap());
        (ImportScheduler::new(connector, ORDER.clone()), transport, backends, backend)
    }

    #[tokio::test]
    async fn created_sales_use_stored_date_and_advance_it() {
        let (scheduler, transport, backends, backend) = scheduler().await;
        scheduler
            .import_sales(backend.id, SalesImportKind::Created, at(10, 0))
            .await
            .unwrap();

        let searches = transport.searches().unwrap();
        let (ty, filters) = &searches[0];
        assert_eq!(ty, &ORDER);
        assert_eq!(filters["CreateTimeFrom"], json!("2024-03-01T06:00:00Z"));
        assert_eq!(filters["CreateTimeTo"], json!("2024-03-01T09:58:00Z"));

        let stored = backends.get(backend.id).await.unwrap().unwrap();
        assert_eq!(stored.import_sales_from_date, Some(at(9, 58)));
        assert_eq!(stored.import_updated_sales_from_date, None);
    }

    #[tokio::test]
    async fn updated_sales_fall_back_to_created_date() {
        let (scheduler, transport, backends, backend) = scheduler().await;
        scheduler
            .import_sales(backend.id, SalesImportKind::Updated, at(10, 0))
            .await
            .unwrap();

        let (_, filters) = &transport.searches().unwrap()[0];
        assert_eq!(filters["ModTimeFrom"], json!("2024-03-01T06:00:00Z"));
        assert!(filters.get("CreateTimeFrom").is_none());
        let stored = backends.get(backend.id).await.unwrap().unwrap();
        assert_eq!(stored.import_updated_sales_from_date, Some(at(9, 58)));
        assert_eq!(stored.import_sales_from_date, Some(at(6, 0)));
    }

    #[tokio::test]
    async fn tick_skips_disabled_backends() {
        let (scheduler, transport, backends, backend) = scheduler().await;
        let mut off = test_backend();
        off.enabled = false;
        backends.upsert(&off).await.unwrap();

        assert_eq!(scheduler.tick(at(10, 0)).await.unwrap(), 1);
        assert_eq!(transport.searches().unwrap().len(), 1);
        let untouched = backends.get(off.id).await.unwrap().unwrap();
        assert_eq!(untouched.import_sales_from_date, None);
        assert!(backends.get(backend.id).await.unwrap().unwrap().import_sales_from_date.is_some());
    }

    #[tokio::test]
    async fn failed_search_keeps_the_from_date() {
        let (scheduler, transport, backends, backend) = scheduler().await;
        transport.fail_search(&ORDER, InjectedFailure::Unavailable).unwrap();

        assert_eq!(scheduler.tick(at(10, 0)).await.unwrap(), 0);
        let stored = backends.get(backend.id).await.unwrap().unwrap();
        assert_eq!(stored.import_sales_from_date, Some(at(6, 0)));
    }
}
