//! Conversions between Value and JSON.
//!
//! Communicator definitions and host configuration can be authored as JSON
//! documents; these helpers turn them into `Value` trees.

use serde_json::Value as Json;

use crate::{Error, Result, Value};

/// Parse a JSON document into a Value.
pub fn parse(text: &str) -> Result<Value> {
    let json: Json = serde_json::from_str(text).map_err(|e| Error::Decode {
        message: e.to_string(),
    })?;
    Ok(from_json(json))
}

/// Convert `serde_json::Value` to our Value.
pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n
                .as_f64()
                .map(Value::Float)
                .unwrap_or_else(|| Value::String(n.to_string())),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        Json::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, from_json(v))).collect()),
    }
}

/// Convert our Value to `serde_json::Value`.
///
/// Bytes become an array of numbers; non-finite floats become null.
pub fn to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Integer(i) => Json::Number(i.into()),
        Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s),
        Value::Bytes(bytes) => Json::Array(bytes.into_iter().map(Json::from).collect()),
        Value::Array(items) => Json::Array(items.into_iter().map(to_json).collect()),
        Value::Map(map) => Json::Object(map.into_iter().map(|(k, v)| (k, to_json(v))).collect()),
    }
}
