use clap::Parser;
use ebaylink_core::{
    BackendConfig, BackendCredentials, BackendStore, ConnectorConfig, EntityType, ExternalId,
    ImportScheduler, SalesImportKind, TaskQueue,
};
use ebaylink_server::cli::{filters, BackendCommand, Cli, Commands};
use ebaylink_server::stores;
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ebaylink_core::o11y::init_tracing()?;
    let cli = Cli::parse();
    let config = ConnectorConfig::from_env()?;
    let stores = stores::open(&cli.data_dir).await?;

    match cli.command {
        Commands::Migrate => {
            tracing::info!(data_dir = %cli.data_dir.display(), "migrations applied");
        }
        Commands::Backend { command } => match command {
            BackendCommand::Add {
                name,
                warehouse,
                client_id,
                dev_id,
                client_secret,
                token,
                sandbox,
                sale_prefix,
                fba_warehouse,
                team,
                category_tree_id,
            } => {
                let credentials = BackendCredentials {
                    client_id,
                    dev_id,
                    client_secret,
                    token,
                    token_valid_until: None,
                };
                let mut backend = BackendConfig::new(name, warehouse, credentials, sandbox)?;
                if sale_prefix.is_some() {
                    backend.sale_prefix = sale_prefix;
                }
                backend.fba_warehouse = fba_warehouse;
                backend.team = team;
                if let Some(tree) = category_tree_id {
                    backend.category_tree_id = tree;
                }
                let connector = stores::connector(&stores, config)?;
                let initial = connector
                    .create_backend(&backend, &ebaylink_integrations::PRODUCT)
                    .await?;
                tracing::info!(
                    backend = %backend.id,
                    name = %backend.name,
                    products = initial.as_ref().map(|r| r.succeeded),
                    "backend added"
                );
                println!("{}", backend.id);
            }
            BackendCommand::List => {
                // Debug on credentials redacts secrets; JSON would not.
                for backend in stores.backends.list().await? {
                    println!(
                        "{}\t{}\tenabled={}\tsandbox={}\tsales_from={:?}\tupdated_sales_from={:?}",
                        backend.id,
                        backend.name,
                        backend.enabled,
                        backend.is_test,
                        backend.import_sales_from_date,
                        backend.import_updated_sales_from_date,
                    );
                }
            }
            BackendCommand::Disable { id } => set_enabled(&stores, id, false).await?,
            BackendCommand::Enable { id } => set_enabled(&stores, id, true).await?,
        },
        Commands::ImportBatch {
            backend,
            entity,
            filters: pairs,
            drain,
        } => {
            let connector = stores::connector(&stores, config)?;
            let report = connector
                .import_batch(backend, &EntityType::new(entity), filters(pairs))
                .await?;
            print_json(&report)?;
            if drain {
                let worked = connector.worker()?.drain().await?;
                tracing::info!(
                    completed = worked.completed,
                    dead_lettered = worked.dead_lettered,
                    "queue drained"
                );
            }
        }
        Commands::ImportRecord {
            backend,
            entity,
            external_id,
            force,
        } => {
            let connector = stores::connector(&stores, config)?;
            let outcome = connector
                .import_record(
                    backend,
                    &EntityType::new(entity),
                    &ExternalId::new(external_id),
                    force,
                )
                .await?;
            print_json(&outcome)?;
        }
        Commands::ExportRecord {
            backend,
            entity,
            internal_id,
            fields,
        } => {
            let connector = stores::connector(&stores, config)?;
            let fields = (!fields.is_empty()).then_some(fields);
            let outcome = connector
                .export_record(backend, &EntityType::new(entity), internal_id, fields)
                .await?;
            print_json(&outcome)?;
        }
        Commands::ImportSales { backend, updated } => {
            let connector = stores::connector(&stores, config)?;
            let scheduler = ImportScheduler::new(connector, ebaylink_integrations::SALE_ORDER.clone());
            let kind = if updated {
                SalesImportKind::Updated
            } else {
                SalesImportKind::Created
            };
            let report = scheduler
                .import_sales(backend, kind, chrono::Utc::now())
                .await?;
            print_json(&report)?;
        }
        Commands::Scheduler => {
            let connector = stores::connector(&stores, config)?;
            let worker = connector.worker()?;
            let scheduler = ImportScheduler::new(connector, ebaylink_integrations::SALE_ORDER.clone());
            tracing::info!("scheduler started");
            tokio::select! {
                res = scheduler.run_loop() => res?,
                res = worker.run_loop() => res?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
            }
        }
        Commands::Worker { once } => {
            let connector = stores::connector(&stores, config)?;
            let worker = connector.worker()?;
            if once {
                let report = worker.drain().await?;
                tracing::info!(
                    claimed = report.claimed,
                    completed = report.completed,
                    retried = report.retried,
                    dead_lettered = report.dead_lettered,
                    "queue drained"
                );
            } else {
                tokio::select! {
                    res = worker.run_loop() => res?,
                    _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
                }
            }
        }
        Commands::DeadLetters => {
            let dead = stores.tasks.dead_letters().await?;
            print_json(&dead)?;
        }
    }

    Ok(())
}

async fn set_enabled(
    stores: &stores::Stores,
    id: ebaylink_core::BackendId,
    enabled: bool,
) -> anyhow::Result<()> {
    let mut backend = stores
        .backends
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("backend {id} not found"))?;
    backend.enabled = enabled;
    backend.touch(chrono::Utc::now());
    stores.backends.upsert(&backend).await?;
    tracing::info!(backend = %id, enabled, "backend updated");
    Ok(())
}
