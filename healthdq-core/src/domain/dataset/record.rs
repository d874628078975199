// healthdq-core/src/domain/dataset/record.rs

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One flat row. Fields are kept sorted so every pass sees them in the same order.
/// Serializes as a flat object with the id under `record_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "record_id")]
    pub id: RecordId,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter, mostly for loaders and tests.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Absent fields read as null.
    pub fn value(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn is_missing(&self, field: &str) -> bool {
        self.value(field).is_missing()
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_field_reads_null() {
        let record = Record::new("r1").with("weight_kg", 70.0);
        assert_eq!(record.value("height_cm"), &Value::Null);
        assert!(record.is_missing("height_cm"));
        assert!(!record.is_missing("weight_kg"));
    }

    #[test]
    fn test_serializes_flat() -> anyhow::Result<()> {
        let record = Record::new("r1").with("weight_kg", 70.0).with("sex_at_birth", "M");
        let json = serde_json::to_value(&record)?;
        assert_eq!(
            json,
            serde_json::json!({"record_id": "r1", "sex_at_birth": "M", "weight_kg": 70.0})
        );
        let back: Record = serde_json::from_value(json)?;
        assert_eq!(back, record);
        Ok(())
    }
}
