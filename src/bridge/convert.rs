//! Argument conversion
//!
//! Hosts hand over whatever the script passed. Everything is checked here
//! and turned into `String`s, or rejected with `InvalidType`.

use serde_json::Value;

use crate::error::{Result, StashError};

/// Convert a host value into a list of keys
///
/// Expects an array of strings.
pub fn keys_from_value(value: &Value) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        StashError::invalid_type(format!("Invalid keys - must be an array. Got: {}", value), None)
    })?;

    items
        .iter()
        .map(|item| match item {
            Value::String(key) => Ok(key.clone()),
            other => Err(StashError::invalid_type(
                format!("Invalid key - must be a string. Key: {}", other),
                None,
            )),
        })
        .collect()
}

/// Convert a host value into key/value pairs
///
/// Expects an array of `[key, value]` arrays whose members are strings.
/// The first bad pair fails the whole conversion.
pub fn pairs_from_value(value: &Value) -> Result<Vec<(String, String)>> {
    let items = value.as_array().ok_or_else(|| {
        StashError::invalid_type(
            format!("Invalid key-value pairs - must be an array. Got: {}", value),
            None,
        )
    })?;

    items.iter().map(pair_from_value).collect()
}

fn pair_from_value(item: &Value) -> Result<(String, String)> {
    let pair = match item.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => {
            return Err(StashError::invalid_type(
                format!("Invalid key-value pair - must be [key, value]. Got: {}", item),
                None,
            ))
        }
    };

    let key = match &pair[0] {
        Value::String(key) => key.clone(),
        other => {
            return Err(StashError::invalid_type(
                format!("Invalid key - must be a string. Key: {}", other),
                None,
            ))
        }
    };

    let value = match &pair[1] {
        Value::String(value) => value.clone(),
        other => {
            return Err(StashError::invalid_type(
                format!("Invalid value for key {} - must be a string. Value: {}", key, other),
                Some(&key),
            ))
        }
    };

    Ok((key, value))
}

/// Render `multi_get` results the way hosts expect them: `[[key, value|null], ...]`
pub fn pairs_to_value(pairs: &[(String, Option<String>)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(key, value)| {
                Value::Array(vec![
                    Value::String(key.clone()),
                    value.clone().map(Value::String).unwrap_or(Value::Null),
                ])
            })
            .collect(),
    )
}
