use std::error::Error as StdError;

/// Common error type for `ebaylink_core`.
///
/// Variants follow the import taxonomy: the task worker asks
/// [`Error::is_retryable`] to decide between retry-with-backoff and dead-lettering.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote marketplace could not be reached (connect, timeout).
    #[error("connectivity error: {context}")]
    Connectivity {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// The remote marketplace answered but is temporarily unable to serve (throttling, 5xx).
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing required field '{field}' for {entity_type}")]
    MissingField { entity_type: String, field: String },

    /// Binder collision or a concurrent write that lost the uniqueness race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient condition, e.g. a dependency that is not bound yet.
    #[error("retryable: {0}")]
    RetryableJob(String),

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    #[tracing::instrument(level = "debug", name = "ebaylink.error.backend", skip(source))]
    pub fn backend(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[tracing::instrument(level = "debug", name = "ebaylink.error.connectivity", skip(source))]
    pub fn connectivity(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Connectivity {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn missing_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    /// Whether the task collaborator should retry the unit that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connectivity { .. }
            | Self::Unavailable(_)
            | Self::RetryableJob(_)
            | Self::Backend { .. }
            | Self::BackendMessage(_) => true,
            Self::InvalidInput(_)
            | Self::NotFound(_)
            | Self::Validation(_)
            | Self::MissingField { .. }
            | Self::Conflict(_) => false,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let unique = e
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            return Self::Conflict(format!("unique constraint violated: {e}"));
        }
        Self::backend("sqlx", e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
