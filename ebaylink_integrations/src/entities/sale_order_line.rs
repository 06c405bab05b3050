use super::{HOST_SALE_ORDER_LINE, PRODUCT, SALE_ORDER_LINE};
use async_trait::async_trait;
use ebaylink_core::mapping::rules::values;
use ebaylink_core::{
    DependencyEdge, EntityImporter, EntityType, Error, Mapper, MappingRule, RuleMapper,
};
use serde_json::json;

/// Order lines. Only imported as children of a sale order.
pub struct SaleOrderLineImporter {
    mapper: RuleMapper,
    deps: Vec<DependencyEdge>,
}

impl SaleOrderLineImporter {
    pub fn new() -> Self {
        Self {
            mapper: RuleMapper::new(vec![
                MappingRule::required("qty_ordered", "product_uom_qty"),
                MappingRule::required("qty_ordered", "product_qty"),
                MappingRule::direct("name", "name"),
                MappingRule::computed("product", |_, _, ctx| {
                    let product = ctx.dependencies.require_one("product")?;
                    Ok(Some(values([("product_id", json!(product.to_string()))])))
                }),
                MappingRule::computed("price_unit", |rec, _, ctx| {
                    let price = match rec.f64("price_unit") {
                        Some(p) => p,
                        None => {
                            let qty = rec.f64("qty_ordered").unwrap_or(0.0);
                            match rec.f64("item_price") {
                                Some(total) if qty > 0.0 => total / qty,
                                _ => {
                                    return Err(Error::missing_field(
                                        ctx.entity_type.as_str(),
                                        "price_unit",
                                    ))
                                }
                            }
                        }
                    };
                    Ok(Some(values([("price_unit", json!(price))])))
                }),
                MappingRule::computed("order", |_, _, ctx| {
                    let order = ctx.require_parent()?;
                    Ok(Some(values([("order_id", json!(order.to_string()))])))
                }),
            ]),
            deps: vec![DependencyEdge::by_key("product", PRODUCT.clone(), "sku")],
        }
    }
}

impl Default for SaleOrderLineImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityImporter for SaleOrderLineImporter {
    fn entity_type(&self) -> &EntityType {
        &SALE_ORDER_LINE
    }

    fn host_type(&self) -> &EntityType {
        &HOST_SALE_ORDER_LINE
    }

    fn mapper(&self) -> &dyn Mapper {
        &self.mapper
    }

    fn dependencies(&self) -> &[DependencyEdge] {
        &self.deps
    }
}
