use crate::models::FieldValues;
use crate::persistence::models::EntityRecord;

/// Internal field to external field copy used on export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRule {
    pub source: String,
    pub target: String,
}

/// Maps an internal entity back to marketplace field values.
#[derive(Debug, Clone, Default)]
pub struct ExportMapper {
    rules: Vec<ExportRule>,
}

impl ExportMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.rules.push(ExportRule {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    /// Map `entity`. When `only` is given, rules whose internal field is not listed are skipped.
    pub fn apply(&self, entity: &EntityRecord, only: Option<&[String]>) -> FieldValues {
        let mut out = FieldValues::new();
        for rule in &self.rules {
            if let Some(only) = only {
                if !only.iter().any(|f| *f == rule.source) {
                    continue;
                }
            }
            if let Some(value) = entity.fields.get(&rule.source) {
                out.insert(rule.target.clone(), value.clone());
            }
        }
        out
    }
}
