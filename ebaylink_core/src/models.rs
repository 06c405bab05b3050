use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
}

/// Identifier of one configured marketplace account (tenant scope).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(pub Uuid);

impl BackendId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackendId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for BackendId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for BackendId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s).map_err(|_| IdParseError::InvalidUuid(s.to_string()))?;
        Ok(Self(id))
    }
}

/// Identifier of an entity inside the host application.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(pub Uuid);

impl InternalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InternalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for InternalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for InternalId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Uuid::parse_str(s).map_err(|_| IdParseError::InvalidUuid(s.to_string()))?;
        Ok(Self(id))
    }
}

/// Identifier of a record on the marketplace.
///
/// Always a string: `"0"` and `""` are valid, distinct identities and are never
/// coalesced with "absent". Absence is expressed with `Option<ExternalId>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build an id from a JSON scalar. Numbers are rendered without coercion so `0` stays `"0"`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Name of a binding model, e.g. `ebay.sale.order`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(crate::Error::InvalidInput("entity type is empty".to_string()));
        }
        Ok(Self::new(s))
    }
}

/// Internal field values produced by a mapper, in write order.
pub type FieldValues = serde_json::Map<String, serde_json::Value>;

/// Filters handed to the transport's search operation.
pub type Filters = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_keeps_zero_and_empty_distinct() {
        let zero = ExternalId::new("0");
        let empty = ExternalId::new("");
        assert_ne!(zero, empty);
        assert_eq!(zero.as_str(), "0");
        assert_eq!(empty.as_str(), "");
        assert_eq!(
            ExternalId::from_json(&serde_json::json!(0)),
            Some(ExternalId::new("0"))
        );
        assert_eq!(ExternalId::from_json(&serde_json::Value::Null), None);
    }

    #[test]
    fn entity_type_serializes_as_plain_string() {
        const ORDER: EntityType = EntityType::from_static("ebay.sale.order");
        let json = serde_json::to_string(&ORDER).unwrap();
        assert_eq!(json, "\"ebay.sale.order\"");
        let back: EntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ORDER);
        assert!("  ".parse::<EntityType>().is_err());
    }

    #[test]
    fn backend_id_parses_uuid() {
        let id = BackendId::new();
        let parsed: BackendId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<BackendId>().is_err());
    }
}
