use crate::models::{BackendId, EntityType, ExternalId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockKey = (BackendId, EntityType, ExternalId);

/// Serializes units of work on the same `(backend, entity_type, external_id)`.
///
/// Entries are dropped once no unit holds or waits on them.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: LockKey,
    locks: Arc<DashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(
        &self,
        backend_id: BackendId,
        entity_type: &EntityType,
        external_id: &ExternalId,
    ) -> KeyGuard {
        let key = (backend_id, entity_type.clone(), external_id.clone());
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key,
            locks: self.locks.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own handle left: nobody holds or waits on this key.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
