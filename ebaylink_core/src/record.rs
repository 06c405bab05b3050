use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw data fetched from the marketplace for one entity.
///
/// Immutable once built: accessors only borrow or clone. Paths are dot-delimited
/// (`partner.email`) and address nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRecord(Map<String, Value>);

impl ExternalRecord {
    pub fn new(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidInput(format!(
                "external record must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Value at `path`, `None` when any segment is missing. A present `null` is returned as `Some(Null)`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for seg in segments {
            current = current.as_object()?.get(seg)?;
        }
        Some(current)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// String at `path`; numbers are not coerced.
    pub fn str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Numeric value at `path`. Marketplace amounts often arrive as strings (`"12.50"`).
    pub fn f64(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" | "True" | "1" => Some(true),
                "false" | "False" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Value at `path`, or `MissingField` when absent or null.
    pub fn require(&self, entity_type: &str, path: &str) -> Result<&Value> {
        match self.get(path) {
            Some(Value::Null) | None => Err(Error::missing_field(entity_type, path)),
            Some(v) => Ok(v),
        }
    }

    /// Nested object at `path` as its own record.
    pub fn child(&self, path: &str) -> Option<ExternalRecord> {
        self.get(path)
            .and_then(Value::as_object)
            .map(|m| ExternalRecord(m.clone()))
    }

    /// Objects of the array at `path`; non-object items are skipped.
    pub fn children(&self, path: &str) -> Vec<ExternalRecord> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|m| ExternalRecord(m.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
