//! Firestore REST wire types and generic value mapping.
//!
//! Entities are plain serde structs. We serialize them to `serde_json::Value`
//! and map that onto the Firestore value envelope, instead of hand-writing a
//! field mapping per type. Integers travel as strings per the Firestore REST
//! contract.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Firestore document value types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub name: Option<String>,
    pub fields: Option<HashMap<String, Value>>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }
}

/// Convert a JSON value into a Firestore value.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::NullValue(()),
        serde_json::Value::Bool(b) => Value::BooleanValue(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else {
                Value::DoubleValue(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::StringValue(s),
        serde_json::Value::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.into_iter().map(json_to_value).collect()),
        }),
        serde_json::Value::Object(map) => Value::MapValue(MapValue {
            fields: Some(
                map.into_iter()
                    .map(|(k, v)| (k, json_to_value(v)))
                    .collect(),
            ),
        }),
    }
}

/// Convert a Firestore value back into JSON.
pub fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::NullValue(()) => serde_json::Value::Null,
        Value::BooleanValue(b) => serde_json::Value::Bool(b),
        Value::IntegerValue(s) => s
            .parse::<i64>()
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or(serde_json::Value::Null),
        Value::DoubleValue(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::TimestampValue(s) | Value::StringValue(s) => serde_json::Value::String(s),
        Value::ArrayValue(array) => serde_json::Value::Array(
            array
                .values
                .unwrap_or_default()
                .into_iter()
                .map(value_to_json)
                .collect(),
        ),
        Value::MapValue(map) => serde_json::Value::Object(
            map.fields
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
    }
}

/// Serialize an entity into Firestore document fields.
pub fn to_fields<T: Serialize>(entity: &T) -> StoreResult<HashMap<String, Value>> {
    let json = serde_json::to_value(entity)?;
    match json {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, json_to_value(v)))
            .collect()),
        _ => Err(StoreError::serialization(
            "entity did not serialize to a JSON object",
        )),
    }
}

/// Deserialize an entity from a Firestore document.
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> StoreResult<T> {
    let fields = doc.fields.clone().unwrap_or_default();
    let json = serde_json::Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect(),
    );
    Ok(serde_json::from_value(json)?)
}

/// Build a field map from explicit (name, json) pairs for partial updates.
pub fn fields_from_pairs(
    pairs: Vec<(&str, serde_json::Value)>,
) -> (HashMap<String, Value>, Vec<String>) {
    let mut fields = HashMap::with_capacity(pairs.len());
    let mut mask = Vec::with_capacity(pairs.len());
    for (name, json) in pairs {
        mask.push(name.to_string());
        fields.insert(name.to_string(), json_to_value(json));
    }
    (fields, mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: i64,
        ratio: f64,
        active: bool,
        tags: Vec<String>,
        note: Option<String>,
    }

    #[test]
    fn round_trips_through_document() {
        let sample = Sample {
            name: "clip".to_string(),
            count: 42,
            ratio: 0.75,
            active: true,
            tags: vec!["a".to_string(), "b".to_string()],
            note: None,
        };

        let fields = to_fields(&sample).unwrap();
        let doc = Document::new(fields);
        let back: Sample = from_document(&doc).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn integers_travel_as_strings() {
        let value = json_to_value(serde_json::json!(7));
        match value {
            Value::IntegerValue(s) => assert_eq!(s, "7"),
            other => panic!("expected IntegerValue, got {:?}", other),
        }
    }

    #[test]
    fn timestamp_values_read_back_as_strings() {
        let json = value_to_json(Value::TimestampValue("2026-01-01T00:00:00Z".to_string()));
        assert_eq!(json, serde_json::json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn pairs_produce_matching_mask() {
        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!("done")),
            ("updated_at", serde_json::json!("2026-01-01T00:00:00Z")),
        ]);
        assert_eq!(fields.len(), 2);
        assert_eq!(mask, vec!["status", "updated_at"]);
    }
}
