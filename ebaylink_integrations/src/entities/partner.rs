//! Buyers, imported from the block embedded in each order and keyed by e-mail.

use super::{HOST_PARTNER, PARTNER};
use async_trait::async_trait;
use ebaylink_core::mapping::rules::values;
use ebaylink_core::{
    EntityImporter, EntityType, FieldValues, ImportEnv, InternalId, Mapper, MappingRule, Result,
    RuleMapper,
};
use serde_json::{json, Value};

pub struct PartnerImporter {
    mapper: RuleMapper,
}

impl PartnerImporter {
    pub fn new() -> Self {
        Self {
            mapper: RuleMapper::new(vec![
                MappingRule::direct("name", "name"),
                MappingRule::direct("alias", "alias"),
                MappingRule::required("email", "email"),
                MappingRule::direct("phone", "phone"),
                MappingRule::direct("street", "street"),
                MappingRule::direct("street2", "street2"),
                MappingRule::direct("street3", "street3"),
                MappingRule::direct("city", "city"),
                MappingRule::direct("zip", "zip"),
                MappingRule::computed("country", |rec, _, _| {
                    Ok(rec
                        .str("country")
                        .filter(|c| !c.is_empty())
                        .map(|c| values([("country_code", json!(c.to_ascii_uppercase()))])))
                }),
                MappingRule::computed("state", |rec, _, _| {
                    let state = match (rec.str("country"), rec.str("state")) {
                        (Some(c), Some(s)) if !c.is_empty() && !s.is_empty() => json!(s),
                        _ => Value::Null,
                    };
                    Ok(Some(values([("state", state)])))
                }),
                MappingRule::computed("type", |_, _, _| {
                    Ok(Some(values([("type", json!("delivery"))])))
                }),
                MappingRule::create_only("is_company", |_, _, _| {
                    Ok(Some(values([("is_company", json!(false))])))
                }),
                MappingRule::create_only("customer", |_, _, _| {
                    Ok(Some(values([("customer", json!(true))])))
                }),
            ]),
        }
    }
}

impl Default for PartnerImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level customers only: companies, or persons without a parent contact.
fn adoptable(fields: &FieldValues) -> bool {
    let customer = fields.get("customer").and_then(Value::as_bool) == Some(true);
    let company = fields.get("is_company").and_then(Value::as_bool) == Some(true);
    let orphan = matches!(fields.get("parent_id"), None | Some(Value::Null));
    customer && (company || orphan)
}

#[async_trait]
impl EntityImporter for PartnerImporter {
    fn entity_type(&self) -> &EntityType {
        &PARTNER
    }

    fn host_type(&self) -> &EntityType {
        &HOST_PARTNER
    }

    fn mapper(&self) -> &dyn Mapper {
        &self.mapper
    }

    /// Adopt the existing customer with the same e-mail instead of duplicating it.
    async fn find_existing(
        &self,
        env: &ImportEnv<'_>,
        values: &FieldValues,
    ) -> Result<Option<InternalId>> {
        let Some(email) = values.get("email").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let candidates = env.entities.search(&HOST_PARTNER, "email", email).await?;
        Ok(candidates
            .into_iter()
            .find(|p| adoptable(&p.fields))
            .map(|p| p.id))
    }
}
