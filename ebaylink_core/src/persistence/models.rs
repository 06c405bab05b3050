use crate::models::{EntityType, FieldValues, InternalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One internal entity as stored by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: InternalId,
    pub entity_type: EntityType,
    pub fields: FieldValues,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(entity_type: EntityType, fields: FieldValues, now: DateTime<Utc>) -> Self {
        Self {
            id: InternalId::new(),
            entity_type,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether writing `values` would change any stored field.
    pub fn differs_from(&self, values: &FieldValues) -> bool {
        values
            .iter()
            .any(|(k, v)| self.fields.get(k).map_or(!v.is_null(), |cur| cur != v))
    }

    /// Merge `values` into the stored fields; keys absent from `values` are kept.
    pub fn merge(&mut self, values: FieldValues, now: DateTime<Utc>) {
        for (k, v) in values {
            self.fields.insert(k, v);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> FieldValues {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn differs_from_ignores_equal_and_absent_nulls() {
        let rec = EntityRecord::new(
            EntityType::from_static("res.partner"),
            fields(json!({"name": "Ann", "zip": "28001"})),
            Utc::now(),
        );
        assert!(!rec.differs_from(&fields(json!({"name": "Ann"}))));
        assert!(!rec.differs_from(&fields(json!({"state": null}))));
        assert!(rec.differs_from(&fields(json!({"zip": "28002"}))));
        assert!(rec.differs_from(&fields(json!({"phone": "1"}))));
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut rec = EntityRecord::new(
            EntityType::from_static("res.partner"),
            fields(json!({"name": "Ann", "zip": "28001"})),
            Utc::now(),
        );
        rec.merge(fields(json!({"zip": null, "city": "Madrid"})), Utc::now());
        assert_eq!(
            serde_json::Value::Object(rec.fields),
            json!({"name": "Ann", "zip": null, "city": "Madrid"})
        );
    }
}
