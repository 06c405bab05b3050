use crate::models::{EntityType, ExternalId, InternalId};
use crate::record::ExternalRecord;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Nested imports deeper than this fail with `Validation`.
pub const MAX_DEPENDENCY_DEPTH: usize = 8;

/// One prerequisite record named by the record being imported.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyRef {
    pub external_id: ExternalId,
    /// The dependency's data when the parent record already embeds it.
    pub record: Option<ExternalRecord>,
}

pub type ExtractFn = Arc<dyn Fn(&ExternalRecord) -> Result<Vec<DependencyRef>> + Send + Sync>;

/// "Importing this entity type requires `entity_type` identified by the extracted keys."
#[derive(Clone)]
pub struct DependencyEdge {
    pub alias: String,
    pub entity_type: EntityType,
    extract: ExtractFn,
}

impl DependencyEdge {
    pub fn new<F>(alias: impl Into<String>, entity_type: EntityType, extract: F) -> Self
    where
        F: Fn(&ExternalRecord) -> Result<Vec<DependencyRef>> + Send + Sync + 'static,
    {
        Self {
            alias: alias.into(),
            entity_type,
            extract: Arc::new(extract),
        }
    }

    /// Single dependency keyed by the scalar at `key_path`. No dependency when absent or null.
    pub fn by_key(alias: impl Into<String>, entity_type: EntityType, key_path: &str) -> Self {
        let key_path = key_path.to_string();
        Self::new(alias, entity_type, move |rec| {
            Ok(rec
                .get(&key_path)
                .and_then(ExternalId::from_json)
                .map(|external_id| DependencyRef {
                    external_id,
                    record: None,
                })
                .into_iter()
                .collect())
        })
    }

    /// Single dependency embedded as an object at `object_path`, keyed by its `key_field`.
    pub fn embedded(
        alias: impl Into<String>,
        entity_type: EntityType,
        object_path: &str,
        key_field: &str,
    ) -> Self {
        let object_path = object_path.to_string();
        let key_field = key_field.to_string();
        Self::new(alias, entity_type, move |rec| {
            let Some(child) = rec.child(&object_path) else {
                return Ok(Vec::new());
            };
            Ok(child
                .get(&key_field)
                .and_then(ExternalId::from_json)
                .map(|external_id| DependencyRef {
                    external_id,
                    record: Some(child.clone()),
                })
                .into_iter()
                .collect())
        })
    }

    /// One dependency per object in the array at `list_path`, keyed by each item's `key_field`.
    pub fn each(
        alias: impl Into<String>,
        entity_type: EntityType,
        list_path: &str,
        key_field: &str,
    ) -> Self {
        let list_path = list_path.to_string();
        let key_field = key_field.to_string();
        Self::new(alias, entity_type, move |rec| {
            let mut out: Vec<DependencyRef> = Vec::new();
            for item in rec.children(&list_path) {
                let Some(external_id) = item.get(&key_field).and_then(ExternalId::from_json) else {
                    continue;
                };
                if out.iter().any(|d| d.external_id == external_id) {
                    continue;
                }
                out.push(DependencyRef {
                    external_id,
                    record: None,
                });
            }
            Ok(out)
        })
    }

    pub fn extract(&self, record: &ExternalRecord) -> Result<Vec<DependencyRef>> {
        (self.extract)(record)
    }
}

impl fmt::Debug for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyEdge")
            .field("alias", &self.alias)
            .field("entity_type", &self.entity_type)
            .finish_non_exhaustive()
    }
}

/// Internal ids of the dependencies imported for one record, keyed by edge alias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedDependencies {
    by_alias: HashMap<String, Vec<(ExternalId, InternalId)>>,
}

impl ResolvedDependencies {
    pub fn insert(&mut self, alias: &str, external_id: ExternalId, internal_id: InternalId) {
        self.by_alias
            .entry(alias.to_string())
            .or_default()
            .push((external_id, internal_id));
    }

    /// The first dependency resolved under `alias`.
    pub fn one(&self, alias: &str) -> Option<InternalId> {
        self.by_alias
            .get(alias)
            .and_then(|deps| deps.first())
            .map(|(_, id)| *id)
    }

    pub fn get(&self, alias: &str, external_id: &ExternalId) -> Option<InternalId> {
        self.by_alias
            .get(alias)
            .and_then(|deps| deps.iter().find(|(ext, _)| ext == external_id))
            .map(|(_, id)| *id)
    }

    pub fn require_one(&self, alias: &str) -> Result<InternalId> {
        self.one(alias)
            .ok_or_else(|| Error::Validation(format!("dependency '{alias}' was not resolved")))
    }

    pub fn require(&self, alias: &str, external_id: &ExternalId) -> Result<InternalId> {
        self.get(alias, external_id).ok_or_else(|| {
            Error::Validation(format!(
                "dependency '{alias}' '{external_id}' was not resolved"
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.by_alias.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARTNER: EntityType = EntityType::from_static("ebay.res.partner");
    const PRODUCT: EntityType = EntityType::from_static("ebay.product.product");

    fn order() -> ExternalRecord {
        ExternalRecord::new(json!({
            "order_id": "9",
            "category_id": 0,
            "partner": {"email": "ann@example.com", "name": "Ann"},
            "lines": [{"sku": "A"}, {"sku": "B"}, {"sku": "A"}, {"qty": 1}],
        }))
        .unwrap()
    }

    #[test]
    fn embedded_edge_carries_the_child_record() {
        let edge = DependencyEdge::embedded("partner", PARTNER, "partner", "email");
        let deps = edge.extract(&order()).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].external_id.as_str(), "ann@example.com");
        assert_eq!(
            deps[0].record.as_ref().and_then(|r| r.str("name")),
            Some("Ann")
        );
    }

    #[test]
    fn each_edge_dedupes_and_skips_keyless_items() {
        let edge = DependencyEdge::each("products", PRODUCT, "lines", "sku");
        let ids: Vec<String> = edge
            .extract(&order())
            .unwrap()
            .into_iter()
            .map(|d| d.external_id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn by_key_keeps_numeric_zero() {
        let edge = DependencyEdge::by_key("parent", PRODUCT, "category_id");
        let deps = edge.extract(&order()).unwrap();
        assert_eq!(deps[0].external_id.as_str(), "0");
        let none = DependencyEdge::by_key("parent", PRODUCT, "missing");
        assert!(none.extract(&order()).unwrap().is_empty());
    }

    #[test]
    fn resolved_lookups() {
        let mut deps = ResolvedDependencies::default();
        let a = InternalId::new();
        deps.insert("products", ExternalId::new("A"), a);
        assert_eq!(deps.require("products", &ExternalId::new("A")).unwrap(), a);
        assert!(deps.require("products", &ExternalId::new("B")).is_err());
        assert!(deps.require_one("partner").is_err());
        assert_eq!(deps.len(), 1);
    }
}
