//! ebaylink core library: the external-record synchronization protocol and its stores.

pub mod backend;
pub mod binding;
pub mod config;
pub mod connector;
pub mod error;
pub mod export;
pub mod import;
pub mod mapping;
pub mod models;
pub mod o11y;
pub mod persistence;
pub mod record;
pub mod scheduler;
pub mod sqlite;
pub mod tasks;
pub mod transport;

pub use backend::models::{BackendConfig, BackendCredentials};
pub use backend::traits::BackendStore;
pub use binding::binder::Binder;
pub use binding::models::{BindMode, Binding};
pub use binding::traits::BindingStore;
pub use config::{BatchMode, ConnectorConfig};
pub use connector::{Connector, ConnectorDeps, WorkContext};
pub use error::{Error, Result};
pub use export::{ExportAction, ExportOutcome, RecordExporter};
pub use import::batch::{BatchFailure, BatchImporter, BatchReport};
pub use import::dependency::{DependencyEdge, DependencyRef, ResolvedDependencies};
pub use import::engine::RecordImporter;
pub use import::registry::{Registry, RegistryBuilder, Role};
pub use import::traits::{
    ChildImport, EntityExporter, EntityImporter, ImportAction, ImportEnv, ImportOutcome,
    ImportStage, MappedExporter, PostProcessWarning,
};
pub use mapping::export::ExportMapper;
pub use mapping::mapper::{MapContext, Mapper, RuleMapper};
pub use mapping::rules::MappingRule;
pub use models::{BackendId, EntityType, ExternalId, FieldValues, Filters, InternalId};
pub use persistence::models::EntityRecord;
pub use persistence::traits::EntityStore;
pub use record::ExternalRecord;
pub use scheduler::{ImportScheduler, SalesImportKind};
pub use tasks::models::{ImportTask, TaskId};
pub use tasks::sqlite::SqliteTaskQueue;
pub use tasks::traits::TaskQueue;
pub use tasks::worker::{TaskRunner, TaskWorker};
pub use transport::traits::{SearchHit, Transport, TransportFactory};
