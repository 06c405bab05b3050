use crate::backend::models::BackendConfig;
use crate::import::dependency::ResolvedDependencies;
use crate::mapping::rules::MappingRule;
use crate::models::{EntityType, FieldValues, InternalId};
use crate::record::ExternalRecord;
use crate::{Error, Result};
use std::sync::Arc;

/// Read-only inputs a mapping may consult besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct MapContext<'a> {
    pub backend: &'a BackendConfig,
    pub entity_type: &'a EntityType,
    /// Internal ids of dependencies imported before mapping.
    pub dependencies: &'a ResolvedDependencies,
    /// Internal id of the parent entity when mapping a child record.
    pub parent: Option<InternalId>,
}

impl MapContext<'_> {
    pub fn require_parent(&self) -> Result<InternalId> {
        self.parent.ok_or_else(|| {
            Error::Validation(format!("{} must be imported with a parent", self.entity_type))
        })
    }
}

/// Turns an external record into internal field values.
pub trait Mapper: Send + Sync {
    /// `existing` is the internal entity being updated, `None` on the create path.
    fn apply(
        &self,
        record: &ExternalRecord,
        existing: Option<InternalId>,
        ctx: &MapContext<'_>,
    ) -> Result<FieldValues>;
}

pub type FinalizeFn =
    Arc<dyn Fn(&ExternalRecord, &mut FieldValues, &MapContext<'_>) -> Result<()> + Send + Sync>;

/// Stock mapper: an ordered rule list plus an optional finalize step.
#[derive(Clone)]
pub struct RuleMapper {
    rules: Vec<MappingRule>,
    finalize: Option<FinalizeFn>,
}

impl RuleMapper {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self {
            rules,
            finalize: None,
        }
    }

    /// Last mutation point before the values are persisted.
    pub fn with_finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&ExternalRecord, &mut FieldValues, &MapContext<'_>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.finalize = Some(Arc::new(f));
        self
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }
}

impl Mapper for RuleMapper {
    fn apply(
        &self,
        record: &ExternalRecord,
        existing: Option<InternalId>,
        ctx: &MapContext<'_>,
    ) -> Result<FieldValues> {
        let mut out = FieldValues::new();
        for rule in &self.rules {
            match rule {
                MappingRule::Direct {
                    source,
                    target,
                    required,
                } => match record.get(source) {
                    Some(serde_json::Value::Null) | None if *required => {
                        return Err(Error::missing_field(ctx.entity_type.as_str(), source));
                    }
                    Some(value) => {
                        out.insert(target.clone(), value.clone());
                    }
                    None => {}
                },
                MappingRule::Computed {
                    name,
                    create_only,
                    func,
                } => {
                    if *create_only && existing.is_some() {
                        continue;
                    }
                    if let Some(partial) = func(record, &out, ctx)? {
                        tracing::trace!(rule = %name, fields = partial.len(), "computed rule applied");
                        for (k, v) in partial {
                            out.insert(k, v);
                        }
                    }
                }
            }
        }
        if let Some(finalize) = &self.finalize {
            finalize(record, &mut out, ctx)?;
        }
        Ok(out)
    }
}
