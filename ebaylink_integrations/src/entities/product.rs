//! Inventory items, keyed by SKU. Imported with their listing images.

use super::{HOST_PRODUCT, PRODUCT};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ebaylink_core::mapping::rules::values;
use ebaylink_core::{
    EntityImporter, EntityType, Error, ExportMapper, ExternalRecord, FieldValues, ImportEnv,
    InternalId, MappedExporter, Mapper, MappingRule, PostProcessWarning, Result, RuleMapper,
};
use serde_json::{json, Value};

pub struct ProductImporter {
    mapper: RuleMapper,
}

impl ProductImporter {
    pub fn new() -> Self {
        Self {
            mapper: RuleMapper::new(vec![
                MappingRule::direct("Title", "name"),
                MappingRule::direct("ItemID", "id_item"),
                MappingRule::required("SKU", "sku"),
                MappingRule::direct("Quantity", "ebay_qty"),
                MappingRule::create_only("type", |_, _, _| {
                    Ok(Some(values([("type", json!("product"))])))
                }),
            ]),
        }
    }
}

impl Default for ProductImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityImporter for ProductImporter {
    fn entity_type(&self) -> &EntityType {
        &PRODUCT
    }

    fn host_type(&self) -> &EntityType {
        &HOST_PRODUCT
    }

    fn mapper(&self) -> &dyn Mapper {
        &self.mapper
    }

    fn validate(&self, values: &FieldValues) -> Result<()> {
        match values.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Ok(()),
            _ => Err(Error::Validation(format!("{PRODUCT} has no name"))),
        }
    }

    /// Download `url_images` in order and keep the last one that exists as the product image.
    async fn after_import(
        &self,
        env: &ImportEnv<'_>,
        record: &ExternalRecord,
        internal_id: InternalId,
    ) -> Result<Vec<PostProcessWarning>> {
        let urls: Vec<&str> = record
            .get("url_images")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let mut warnings = Vec::new();
        let mut image = None;
        for url in urls {
            match env.transport.fetch_asset(url).await {
                Ok(Some(bytes)) => image = Some(bytes),
                Ok(None) => tracing::debug!(%url, "product image missing; skipped"),
                Err(e) => warnings.push(PostProcessWarning::from_error("image", &e)),
            }
        }
        if let Some(bytes) = image {
            env.entities
                .update(
                    &HOST_PRODUCT,
                    internal_id,
                    values([("image", json!(STANDARD.encode(bytes)))]),
                )
                .await?;
        }
        Ok(warnings)
    }
}

/// Pushes name, quantity and SKU back to the inventory item.
pub fn exporter() -> MappedExporter {
    MappedExporter::new(
        PRODUCT.clone(),
        HOST_PRODUCT.clone(),
        ExportMapper::new()
            .rule("sku", "SKU")
            .rule("name", "Title")
            .rule("ebay_qty", "Quantity"),
    )
}
