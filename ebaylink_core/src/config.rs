use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// How a batch importer hands each listed record to the record importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Import each record in-line, in the batch's own task.
    #[default]
    Direct,
    /// Enqueue one deferred task per record.
    Delayed,
}

impl FromStr for BatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "delayed" => Ok(Self::Delayed),
            other => Err(Error::InvalidInput(format!(
                "unknown batch mode '{other}' (expected direct|delayed)"
            ))),
        }
    }
}

/// Process-wide connector settings.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Default batch mode for entities that do not pin one.
    pub batch_mode: BatchMode,

    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,

    /// Task units executed concurrently by one worker.
    pub worker_concurrency: usize,
    pub worker_poll_interval_ms: u64,

    /// How often the sale-order scheduler ticks.
    pub scheduler_poll_interval_ms: u64,

    /// Timeout for one marketplace HTTP call.
    pub http_timeout_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            batch_mode: BatchMode::Direct,
            max_retries: 5,
            retry_backoff_base_ms: 1_000,
            retry_backoff_max_ms: 60_000,
            worker_concurrency: 4,
            worker_poll_interval_ms: 1_000,
            scheduler_poll_interval_ms: 300_000,
            http_timeout_ms: 20_000,
        }
    }
}

impl ConnectorConfig {
    /// Read `EBAYLINK_*` variables, falling back to defaults for anything unset.
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            batch_mode: match std::env::var("EBAYLINK_BATCH_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => d.batch_mode,
            },
            max_retries: env_parse("EBAYLINK_MAX_RETRIES")?.unwrap_or(d.max_retries),
            retry_backoff_base_ms: env_parse("EBAYLINK_RETRY_BACKOFF_BASE_MS")?
                .unwrap_or(d.retry_backoff_base_ms),
            retry_backoff_max_ms: env_parse("EBAYLINK_RETRY_BACKOFF_MAX_MS")?
                .unwrap_or(d.retry_backoff_max_ms),
            worker_concurrency: env_parse("EBAYLINK_WORKER_CONCURRENCY")?
                .unwrap_or(d.worker_concurrency),
            worker_poll_interval_ms: env_parse("EBAYLINK_WORKER_POLL_INTERVAL_MS")?
                .unwrap_or(d.worker_poll_interval_ms),
            scheduler_poll_interval_ms: env_parse("EBAYLINK_SCHEDULER_POLL_INTERVAL_MS")?
                .unwrap_or(d.scheduler_poll_interval_ms),
            http_timeout_ms: env_parse("EBAYLINK_HTTP_TIMEOUT_MS")?.unwrap_or(d.http_timeout_ms),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidInput("max_retries must be > 0".to_string()));
        }
        if self.retry_backoff_base_ms == 0 {
            return Err(Error::InvalidInput(
                "retry_backoff_base_ms must be > 0".to_string(),
            ));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_base_ms {
            return Err(Error::InvalidInput(
                "retry_backoff_max_ms must be >= retry_backoff_base_ms".to_string(),
            ));
        }
        if self.worker_concurrency == 0 {
            return Err(Error::InvalidInput(
                "worker_concurrency must be > 0".to_string(),
            ));
        }
        if self.worker_poll_interval_ms == 0 || self.scheduler_poll_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "poll intervals must be > 0".to_string(),
            ));
        }
        if self.http_timeout_ms == 0 {
            return Err(Error::InvalidInput("http_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Exponential backoff: base * 2^retry_count, capped at `retry_backoff_max_ms`.
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        let shift = retry_count.min(63);
        let exp = 1u128 << shift;
        let ms = (self.retry_backoff_base_ms as u128).saturating_mul(exp);
        Duration::from_millis(ms.min(self.retry_backoff_max_ms as u128) as u64)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidInput(format!("{key} has an invalid value: '{v}'"))),
        Err(_) => Ok(None),
    }
}
