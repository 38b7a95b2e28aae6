//! Argument validation against a tool's JSON schema
//!
//! Covers the subset tool schemas use: `type`, `properties`, `required`,
//! `items`, `enum`, `minimum` and `additionalProperties: false`.

use serde_json::Value;

/// Check `value` against `schema`, returning the first violation found
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at(schema, value, "arguments")
}

fn validate_at(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!(
                "{path} must be of type {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path} must be one of {}", Value::Array(allowed.clone())));
        }
    }

    if let (Some(min), Some(n)) = (schema.get("minimum").and_then(Value::as_f64), value.as_f64()) {
        if n < min {
            return Err(format!("{path} must be at least {min}"));
        }
    }

    if let Some(obj) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(field) {
                    return Err(format!("{path}.{field} is required"));
                }
            }
        }

        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, field_value) in obj {
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => {
                    validate_at(field_schema, field_value, &format!("{path}.{key}"))?;
                }
                None if closed => return Err(format!("{path}.{key} is not a known field")),
                None => {}
            }
        }
    }

    if let (Some(items), Some(elements)) = (schema.get("items"), value.as_array()) {
        for (i, element) in elements.iter().enumerate() {
            validate_at(items, element, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
