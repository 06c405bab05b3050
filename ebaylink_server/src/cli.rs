use clap::{Parser, Subcommand};
use ebaylink_core::{BackendId, Filters, InternalId};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ebaylink", version, about = "eBay marketplace connector")]
pub struct Cli {
    /// Data directory holding the SQLite database.
    #[arg(long, global = true, env = "EBAYLINK_DATA_DIR", default_value = ".ebaylink")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or upgrade the connector tables.
    Migrate,

    /// Manage marketplace accounts.
    Backend {
        #[command(subcommand)]
        command: BackendCommand,
    },

    /// List records matching filters and import (or enqueue) each of them.
    ImportBatch {
        #[arg(long)]
        backend: BackendId,
        /// Connector entity type, e.g. `ebay.sale.order`.
        #[arg(long)]
        entity: String,
        /// Search filter as `key=value`; JSON values are parsed, anything else is a string.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,
        /// Run the queued tasks to completion before exiting.
        #[arg(long)]
        drain: bool,
    },

    /// Import one record by its marketplace id.
    ImportRecord {
        #[arg(long)]
        backend: BackendId,
        #[arg(long)]
        entity: String,
        #[arg(long)]
        external_id: String,
        /// Re-import even when the entity says the record must be skipped.
        #[arg(long)]
        force: bool,
    },

    /// Push one host entity to the marketplace.
    ExportRecord {
        #[arg(long)]
        backend: BackendId,
        #[arg(long)]
        entity: String,
        #[arg(long)]
        internal_id: InternalId,
        /// Restrict the export to these host fields (repeatable).
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Import the sales window for one backend and advance its from-date.
    ImportSales {
        #[arg(long)]
        backend: BackendId,
        /// Orders modified in the window instead of orders created in it.
        #[arg(long)]
        updated: bool,
    },

    /// Poll every enabled backend for new sales and run the task worker until interrupted.
    Scheduler,

    /// Run queued import tasks.
    Worker {
        /// Drain what is due and exit instead of polling.
        #[arg(long)]
        once: bool,
    },

    /// Print dead-lettered tasks as JSON.
    DeadLetters,
}

#[derive(Debug, Subcommand)]
pub enum BackendCommand {
    /// Register a marketplace account.
    Add {
        #[arg(long)]
        name: String,
        /// Warehouse for merchant-fulfilled orders.
        #[arg(long)]
        warehouse: String,
        #[arg(long, env = "EBAYLINK_CLIENT_ID")]
        client_id: String,
        #[arg(long, env = "EBAYLINK_DEV_ID")]
        dev_id: String,
        #[arg(long, env = "EBAYLINK_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
        #[arg(long, env = "EBAYLINK_TOKEN", hide_env_values = true)]
        token: String,
        /// Use the sandbox API.
        #[arg(long)]
        sandbox: bool,
        #[arg(long)]
        sale_prefix: Option<String>,
        /// Warehouse for marketplace-fulfilled orders.
        #[arg(long)]
        fba_warehouse: Option<String>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        category_tree_id: Option<String>,
    },

    /// Print configured backends (credentials redacted).
    List,

    Disable {
        id: BackendId,
    },

    Enable {
        id: BackendId,
    },
}

/// Parse `key=value`. The value is taken as JSON when it parses, else as a plain string.
pub fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter key in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn filters(pairs: Vec<(String, Value)>) -> Filters {
    pairs.into_iter().collect()
}
