//! Marketplace category tree.

use super::CATEGORY;
use async_trait::async_trait;
use ebaylink_core::mapping::rules::values;
use ebaylink_core::{
    BatchMode, DependencyEdge, DependencyRef, EntityImporter, EntityType, ExternalId, Mapper,
    MappingRule, RuleMapper,
};
use serde_json::{json, Value};

pub struct CategoryImporter {
    mapper: RuleMapper,
    deps: Vec<DependencyEdge>,
}

impl CategoryImporter {
    pub fn new() -> Self {
        Self {
            mapper: RuleMapper::new(vec![
                MappingRule::required("id_category", "id_category"),
                MappingRule::direct("is_leaf_category", "is_leaf_category"),
                MappingRule::direct("level", "level"),
                MappingRule::computed("name", |rec, _, _| {
                    let name = match rec.str("name").filter(|n| !n.trim().is_empty()) {
                        Some(n) => n.to_string(),
                        None => format!(
                            "Category {}",
                            rec.get("id_category")
                                .and_then(ExternalId::from_json)
                                .map(|id| id.to_string())
                                .unwrap_or_default()
                        ),
                    };
                    Ok(Some(values([("name", json!(name))])))
                }),
                MappingRule::computed("parent", |_, _, ctx| {
                    let parent = ctx
                        .dependencies
                        .one("parent")
                        .map_or(Value::Null, |id| json!(id.to_string()));
                    Ok(Some(values([("parent_category_id", parent)])))
                }),
            ]),
            deps: vec![DependencyEdge::new("parent", CATEGORY.clone(), |rec| {
                let own = rec.get("id_category").and_then(ExternalId::from_json);
                let parent = rec.get("parent_category_id").and_then(ExternalId::from_json);
                Ok(match parent {
                    Some(p) if Some(&p) != own.as_ref() => vec![DependencyRef {
                        external_id: p,
                        record: None,
                    }],
                    _ => Vec::new(),
                })
            })],
        }
    }
}

impl Default for CategoryImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityImporter for CategoryImporter {
    fn entity_type(&self) -> &EntityType {
        &CATEGORY
    }

    fn mapper(&self) -> &dyn Mapper {
        &self.mapper
    }

    fn dependencies(&self) -> &[DependencyEdge] {
        &self.deps
    }

    fn batch_mode(&self) -> Option<BatchMode> {
        Some(BatchMode::Delayed)
    }
}
