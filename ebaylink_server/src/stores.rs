//! SQLite wiring: one database file under the data dir backs every store and the task queue.

use ebaylink_core::backend::sqlite::SqliteBackendStore;
use ebaylink_core::binding::sqlite::SqliteBindingStore;
use ebaylink_core::persistence::sqlite::SqliteEntityStore;
use ebaylink_core::sqlite::open_pool;
use ebaylink_core::{Connector, ConnectorConfig, ConnectorDeps, SqliteTaskQueue};
use ebaylink_integrations::EbayTransportFactory;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DB_FILE: &str = "ebaylink.db";

#[derive(Clone)]
pub struct Stores {
    pub backends: Arc<SqliteBackendStore>,
    pub bindings: Arc<SqliteBindingStore>,
    pub entities: Arc<SqliteEntityStore>,
    pub tasks: Arc<SqliteTaskQueue>,
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}

/// Open the database and apply every schema. Safe to call on an existing file.
#[tracing::instrument(level = "info")]
pub async fn open(data_dir: &Path) -> anyhow::Result<Stores> {
    let path = db_path(data_dir);
    let pool = open_pool(&path).await?;

    let backends = SqliteBackendStore::new(pool.clone());
    backends.migrate().await?;
    let bindings = SqliteBindingStore::new(pool.clone());
    bindings.migrate().await?;
    let entities = SqliteEntityStore::new(pool.clone());
    entities.migrate().await?;
    let tasks = SqliteTaskQueue::new(pool);
    tasks.migrate().await?;

    tracing::info!(db = %path.display(), "stores ready");
    Ok(Stores {
        backends: Arc::new(backends),
        bindings: Arc::new(bindings),
        entities: Arc::new(entities),
        tasks: Arc::new(tasks),
    })
}

/// Connector over `stores`, talking to the eBay REST API.
pub fn connector(stores: &Stores, config: ConnectorConfig) -> anyhow::Result<Arc<Connector>> {
    let deps = ConnectorDeps::new(
        stores.backends.clone(),
        stores.bindings.clone(),
        stores.entities.clone(),
        stores.tasks.clone(),
        Arc::new(EbayTransportFactory::new(config.http_timeout())),
    );
    let connector = Connector::new(deps, ebaylink_integrations::registry()?, config)?;
    Ok(Arc::new(connector))
}
