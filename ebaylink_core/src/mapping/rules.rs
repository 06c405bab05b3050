use crate::mapping::mapper::MapContext;
use crate::models::FieldValues;
use crate::record::ExternalRecord;
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// A computed rule: reads the whole record and the values mapped so far, returns a
/// partial mapping or `None` for no-op.
pub type ComputeFn = Arc<
    dyn Fn(&ExternalRecord, &FieldValues, &MapContext<'_>) -> Result<Option<FieldValues>>
        + Send
        + Sync,
>;

/// One rule of a mapping rule set. Rules run in declaration order; a later rule writing
/// the same target overrides an earlier one.
#[derive(Clone)]
pub enum MappingRule {
    /// Copy `source` (dotted path) to `target`. An absent optional source writes nothing.
    Direct {
        source: String,
        target: String,
        required: bool,
    },
    Computed {
        name: String,
        create_only: bool,
        func: ComputeFn,
    },
}

impl MappingRule {
    pub fn direct(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Direct {
            source: source.into(),
            target: target.into(),
            required: false,
        }
    }

    pub fn required(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Direct {
            source: source.into(),
            target: target.into(),
            required: true,
        }
    }

    pub fn computed<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ExternalRecord, &FieldValues, &MapContext<'_>) -> Result<Option<FieldValues>>
            + Send
            + Sync
            + 'static,
    {
        Self::Computed {
            name: name.into(),
            create_only: false,
            func: Arc::new(func),
        }
    }

    /// Computed rule that only runs when no internal entity exists yet.
    pub fn create_only<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ExternalRecord, &FieldValues, &MapContext<'_>) -> Result<Option<FieldValues>>
            + Send
            + Sync
            + 'static,
    {
        Self::Computed {
            name: name.into(),
            create_only: true,
            func: Arc::new(func),
        }
    }

    pub fn is_create_only(&self) -> bool {
        matches!(self, Self::Computed { create_only: true, .. })
    }
}

impl fmt::Debug for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct {
                source,
                target,
                required,
            } => f
                .debug_struct("Direct")
                .field("source", source)
                .field("target", target)
                .field("required", required)
                .finish(),
            Self::Computed {
                name, create_only, ..
            } => f
                .debug_struct("Computed")
                .field("name", name)
                .field("create_only", create_only)
                .finish(),
        }
    }
}

/// Build a `FieldValues` from `(key, value)` pairs. Handy inside computed rules.
pub fn values<I, K>(pairs: I) -> FieldValues
where
    I: IntoIterator<Item = (K, serde_json::Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
