//! Sale orders: buyer and products first, then the order, then its lines.

use super::{HOST_SALE_ORDER, PARTNER, PRODUCT, SALE_ORDER, SALE_ORDER_LINE};
use async_trait::async_trait;
use ebaylink_core::mapping::rules::values;
use ebaylink_core::{
    ChildImport, DependencyEdge, EntityImporter, EntityType, Error, ExternalId, ExternalRecord,
    FieldValues, InternalId, Mapper, MappingRule, Result, RuleMapper,
};
use serde_json::{json, Value};

/// `(item_price, ship_price)` summed over the order lines, or `None` without lines.
fn line_totals(record: &ExternalRecord) -> Option<(f64, f64)> {
    let lines = record.children("lines");
    if lines.is_empty() {
        return None;
    }
    Some(lines.iter().fold((0.0, 0.0), |(items, ship), line| {
        (
            items + line.f64("item_price").unwrap_or(0.0),
            ship + line.f64("ship_price").unwrap_or(0.0),
        )
    }))
}

pub struct SaleOrderImporter {
    mapper: RuleMapper,
    deps: Vec<DependencyEdge>,
}

impl SaleOrderImporter {
    pub fn new() -> Self {
        let rules = vec![
            MappingRule::required("order_id", "id_ebay_order"),
            MappingRule::direct("date_order", "date_purchase"),
            MappingRule::direct("total_product_price", "total_product_amount"),
            MappingRule::direct("earliest_delivery_date", "date_earliest_delivery"),
            MappingRule::direct("earliest_ship_date", "date_earliest_ship"),
            MappingRule::direct("latest_delivery_date", "date_latest_delivery"),
            MappingRule::direct("latest_ship_date", "date_latest_ship"),
            MappingRule::direct("FulfillmentChannel", "fulfillment_channel"),
            MappingRule::direct("ship_service_level", "shipment_service_level_category"),
            MappingRule::computed("name", |rec, _, ctx| {
                let id = rec
                    .get("order_id")
                    .and_then(ExternalId::from_json)
                    .ok_or_else(|| Error::missing_field(ctx.entity_type.as_str(), "order_id"))?;
                let prefix = ctx.backend.sale_prefix.as_deref().unwrap_or("");
                Ok(Some(values([("name", json!(format!("{prefix}{id}")))])))
            }),
            MappingRule::computed("partner", |_, _, ctx| {
                let partner = ctx.dependencies.require_one("buyer")?;
                Ok(Some(values([("partner_id", json!(partner.to_string()))])))
            }),
            MappingRule::computed("team", |_, _, ctx| {
                Ok(ctx
                    .backend
                    .team
                    .as_ref()
                    .map(|team| values([("team", json!(team))])))
            }),
            MappingRule::computed("warehouse", |rec, _, ctx| {
                match rec.str("FulfillmentChannel") {
                    None | Some("MFN") => Ok(Some(values([(
                        "warehouse",
                        json!(ctx.backend.warehouse),
                    )]))),
                    Some("AFN") => {
                        let fba = ctx.backend.fba_warehouse.as_ref().ok_or_else(|| {
                            Error::Validation(format!(
                                "backend {} has no marketplace-fulfilled warehouse",
                                ctx.backend.id
                            ))
                        })?;
                        Ok(Some(values([("fba_warehouse", json!(fba))])))
                    }
                    Some(_) => Ok(None),
                }
            }),
            MappingRule::computed("currency", |rec, _, _| {
                Ok(rec
                    .str("currency")
                    .filter(|c| !c.is_empty())
                    .map(|c| values([("currency_code", json!(c.to_ascii_uppercase()))])))
            }),
            MappingRule::computed("totals", |rec, _, _| {
                Ok(line_totals(rec).map(|(items, ship)| {
                    values([
                        ("total_product_amount", json!(items)),
                        ("total_ship_amount", json!(ship)),
                        ("total_amount", json!(items + ship)),
                    ])
                }))
            }),
            MappingRule::computed("backend", |_, _, ctx| {
                Ok(Some(values([("backend_id", json!(ctx.backend.id.to_string()))])))
            }),
        ];
        Self {
            mapper: RuleMapper::new(rules).with_finalize(|_, out, _| {
                out.entry("order_line").or_insert_with(|| json!([]));
                let partner = out.get("partner_id").cloned().unwrap_or(Value::Null);
                out.insert("partner_invoice_id".to_string(), partner.clone());
                out.insert("partner_shipping_id".to_string(), partner);
                Ok(())
            }),
            deps: vec![
                DependencyEdge::embedded("buyer", PARTNER.clone(), "buyer", "email"),
                DependencyEdge::each("products", PRODUCT.clone(), "lines", "sku"),
            ],
        }
    }
}

impl Default for SaleOrderImporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityImporter for SaleOrderImporter {
    fn entity_type(&self) -> &EntityType {
        &SALE_ORDER
    }

    fn host_type(&self) -> &EntityType {
        &HOST_SALE_ORDER
    }

    fn mapper(&self) -> &dyn Mapper {
        &self.mapper
    }

    fn dependencies(&self) -> &[DependencyEdge] {
        &self.deps
    }

    fn must_skip(
        &self,
        _record: &ExternalRecord,
        existing: Option<InternalId>,
        force: bool,
    ) -> Option<String> {
        (existing.is_some() && !force).then(|| "Already imported".to_string())
    }

    fn validate(&self, values: &FieldValues) -> Result<()> {
        for key in ["total_product_amount", "total_ship_amount", "total_amount"] {
            if let Some(v) = values.get(key).and_then(Value::as_f64) {
                if v < 0.0 {
                    return Err(Error::Validation(format!("{key} is negative: {v}")));
                }
            }
        }
        Ok(())
    }

    fn children(&self, record: &ExternalRecord) -> Result<Vec<ChildImport>> {
        record
            .children("lines")
            .into_iter()
            .map(|line| {
                let external_id = line
                    .get("item_id")
                    .and_then(ExternalId::from_json)
                    .ok_or_else(|| Error::missing_field(SALE_ORDER_LINE.as_str(), "item_id"))?;
                Ok(ChildImport {
                    entity_type: SALE_ORDER_LINE.clone(),
                    external_id,
                    record: line,
                })
            })
            .collect()
    }
}
