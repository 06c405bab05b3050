//! In-memory transport used by tests and local dry runs.

use crate::backend::models::BackendConfig;
use crate::models::{EntityType, ExternalId, FieldValues, Filters};
use crate::record::ExternalRecord;
use crate::transport::traits::{SearchHit, Transport, TransportFactory};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Failure to inject on `read`, `search` or `fetch_asset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Connectivity,
    NotFound,
    Unavailable,
}

#[derive(Default)]
struct State {
    // Insertion order is the search order.
    records: HashMap<EntityType, Vec<(ExternalId, ExternalRecord)>>,
    failures: HashMap<(EntityType, ExternalId), InjectedFailure>,
    search_failures: HashMap<EntityType, InjectedFailure>,
    assets: HashMap<String, Vec<u8>>,
    asset_failures: HashMap<String, InjectedFailure>,
    searches: Vec<(EntityType, Filters)>,
    embed_in_search: bool,
}

/// Marketplace fake backed by a map of records per entity type.
///
/// Clones share state, so a test can keep a handle while the connector owns another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<State>>,
    reads: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

fn injected(kind: InjectedFailure, what: String) -> Error {
    match kind {
        InjectedFailure::Connectivity => Error::connectivity(
            what,
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
        ),
        InjectedFailure::NotFound => Error::NotFound(what),
        InjectedFailure::Unavailable => Error::Unavailable(what),
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::BackendMessage("memory transport lock poisoned".to_string()))
    }

    /// Search hits carry the full record, like list endpoints that return whole objects.
    pub fn embed_records_in_search(&self, on: bool) -> Result<()> {
        self.state()?.embed_in_search = on;
        Ok(())
    }

    /// Add or replace a record.
    pub fn put(&self, entity_type: &EntityType, external_id: impl Into<ExternalId>, record: ExternalRecord) -> Result<()> {
        let external_id = external_id.into();
        let mut state = self.state()?;
        let rows = state.records.entry(entity_type.clone()).or_default();
        match rows.iter_mut().find(|(id, _)| *id == external_id) {
            Some(row) => row.1 = record,
            None => rows.push((external_id, record)),
        }
        Ok(())
    }

    pub fn record(&self, entity_type: &EntityType, external_id: &ExternalId) -> Result<Option<ExternalRecord>> {
        Ok(self
            .state()?
            .records
            .get(entity_type)
            .and_then(|rows| rows.iter().find(|(id, _)| id == external_id))
            .map(|(_, r)| r.clone()))
    }

    pub fn fail_read(&self, entity_type: &EntityType, external_id: impl Into<ExternalId>, kind: InjectedFailure) -> Result<()> {
        self.state()?
            .failures
            .insert((entity_type.clone(), external_id.into()), kind);
        Ok(())
    }

    pub fn fail_search(&self, entity_type: &EntityType, kind: InjectedFailure) -> Result<()> {
        self.state()?
            .search_failures
            .insert(entity_type.clone(), kind);
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<()> {
        let mut state = self.state()?;
        state.failures.clear();
        state.search_failures.clear();
        state.asset_failures.clear();
        Ok(())
    }

    pub fn put_asset(&self, url: impl Into<String>, bytes: Vec<u8>) -> Result<()> {
        self.state()?.assets.insert(url.into(), bytes);
        Ok(())
    }

    pub fn fail_asset(&self, url: impl Into<String>, kind: InjectedFailure) -> Result<()> {
        self.state()?.asset_failures.insert(url.into(), kind);
        Ok(())
    }

    /// Every `(entity_type, filters)` pair passed to `search`, oldest first.
    pub fn searches(&self) -> Result<Vec<(EntityType, Filters)>> {
        Ok(self.state()?.searches.clone())
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn search(&self, entity_type: &EntityType, filters: &Filters) -> Result<Vec<SearchHit>> {
        let mut state = self.state()?;
        state.searches.push((entity_type.clone(), filters.clone()));
        if let Some(kind) = state.search_failures.get(entity_type) {
            return Err(injected(*kind, format!("search {entity_type}")));
        }
        let embed = state.embed_in_search;
        Ok(state
            .records
            .get(entity_type)
            .map(|rows| {
                rows.iter()
                    .map(|(id, rec)| {
                        if embed {
                            SearchHit::with_record(id.clone(), rec.clone())
                        } else {
                            SearchHit::id_only(id.clone())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        attributes: &[String],
    ) -> Result<ExternalRecord> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state()?;
        let what = format!("{entity_type} '{external_id}'");
        if let Some(kind) = state.failures.get(&(entity_type.clone(), external_id.clone())) {
            return Err(injected(*kind, what));
        }
        let record = state
            .records
            .get(entity_type)
            .and_then(|rows| rows.iter().find(|(id, _)| id == external_id))
            .map(|(_, r)| r.clone())
            .ok_or(Error::NotFound(what))?;
        if attributes.is_empty() {
            return Ok(record);
        }
        let picked = record
            .as_map()
            .iter()
            .filter(|(k, _)| attributes.iter().any(|a| a == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(ExternalRecord::from_map(picked))
    }

    async fn create(&self, entity_type: &EntityType, data: &FieldValues) -> Result<ExternalId> {
        let id = ExternalId::new((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
        self.put(entity_type, id.clone(), ExternalRecord::from_map(data.clone()))?;
        Ok(id)
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        data: &FieldValues,
    ) -> Result<()> {
        let mut state = self.state()?;
        let row = state
            .records
            .get_mut(entity_type)
            .and_then(|rows| rows.iter_mut().find(|(id, _)| id == external_id))
            .ok_or_else(|| Error::NotFound(format!("{entity_type} '{external_id}'")))?;
        let mut merged = row.1.as_map().clone();
        for (k, v) in data {
            merged.insert(k.clone(), v.clone());
        }
        row.1 = ExternalRecord::from_map(merged);
        Ok(())
    }

    async fn delete(&self, entity_type: &EntityType, external_id: &ExternalId) -> Result<()> {
        let mut state = self.state()?;
        let rows = state
            .records
            .get_mut(entity_type)
            .ok_or_else(|| Error::NotFound(format!("{entity_type} '{external_id}'")))?;
        let before = rows.len();
        rows.retain(|(id, _)| id != external_id);
        if rows.len() == before {
            return Err(Error::NotFound(format!("{entity_type} '{external_id}'")));
        }
        Ok(())
    }

    async fn fetch_asset(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state()?;
        match state.asset_failures.get(url) {
            Some(InjectedFailure::NotFound) => Ok(None),
            Some(kind) => Err(injected(*kind, format!("asset {url}"))),
            None => Ok(state.assets.get(url).cloned()),
        }
    }
}

/// Hands out sessions over one shared [`MemoryTransport`] and counts the open ones.
#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    transport: MemoryTransport,
    open_sessions: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl MemoryTransportFactory {
    pub fn new(transport: MemoryTransport) -> Self {
        Self {
            transport,
            open_sessions: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn transport(&self) -> &MemoryTransport {
        &self.transport
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

struct MemorySession {
    inner: MemoryTransport,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemorySession {
    async fn search(&self, entity_type: &EntityType, filters: &Filters) -> Result<Vec<SearchHit>> {
        self.inner.search(entity_type, filters).await
    }

    async fn read(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        attributes: &[String],
    ) -> Result<ExternalRecord> {
        self.inner.read(entity_type, external_id, attributes).await
    }

    async fn create(&self, entity_type: &EntityType, data: &FieldValues) -> Result<ExternalId> {
        self.inner.create(entity_type, data).await
    }

    async fn update(
        &self,
        entity_type: &EntityType,
        external_id: &ExternalId,
        data: &FieldValues,
    ) -> Result<()> {
        self.inner.update(entity_type, external_id, data).await
    }

    async fn delete(&self, entity_type: &EntityType, external_id: &ExternalId) -> Result<()> {
        self.inner.delete(entity_type, external_id).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<Option<Vec<u8>>> {
        self.inner.fetch_asset(url).await
    }
}

#[async_trait]
impl TransportFactory for MemoryTransportFactory {
    async fn open(&self, backend: &BackendConfig) -> Result<Arc<dyn Transport>> {
        if !backend.enabled {
            return Err(Error::InvalidInput(format!(
                "backend '{}' is disabled",
                backend.name
            )));
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            inner: self.transport.clone(),
            open_sessions: self.open_sessions.clone(),
        }))
    }
}
