//! Formatting and validation for tool calls and results
//!
//! Tool servers return heterogeneous payloads (plain strings, content
//! item lists, arbitrary JSON); this module normalizes them into a single
//! display string, and validates call arguments against a tool's declared
//! schema before execution.

use serde_json::{Map, Value};
use toolbridge_mcp::McpTool;

use crate::error::{Result, ToolError};

/// Preview length for binary/data content items
const DATA_PREVIEW_CHARS: usize = 20;

/// Truncate a string to max chars, adding "..." if truncated
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let prefix: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", prefix)
    }
}

/// Human-readable "using tool" line
pub fn format_tool_call(name: &str, arguments: &Value) -> String {
    format!("Using tool: {} with parameters: {}", name, arguments)
}

/// Normalize a raw tool result into display text.
///
/// Priority: a string `content` is returned verbatim; a list renders each
/// item (text field, truncated data placeholder, or stringified) joined
/// with newlines; any other `content` is stringified with literal `\n`
/// sequences unescaped; no `content` field stringifies the whole result.
pub fn format_tool_result(result: &Value) -> String {
    let Some(content) = result.get("content") else {
        return stringify(result);
    };

    match content {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(format_content_item)
            .collect::<Vec<_>>()
            .join("\n"),
        other => stringify(other).replace("\\n", "\n"),
    }
}

fn format_content_item(item: &Value) -> String {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(data) = item.get("data").and_then(Value::as_str) {
        let preview: String = data.chars().take(DATA_PREVIEW_CHARS).collect();
        return format!("[Image/Data: {}...]", preview);
    }
    stringify(item)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate and coerce arguments against the tool's declared schema.
///
/// No schema means no opinion: arguments pass through unchanged. Required
/// fields are checked first, then each declared property present in the
/// arguments is coerced to its declared type. String coercion never
/// fails; every other coercion can fail with a field-level error, which
/// aborts validation for the call.
pub fn validate_tool_args(tool: &McpTool, arguments: &Value) -> Result<Value> {
    let schema = &tool.input_schema;
    if !schema.is_object() {
        return Ok(arguments.clone());
    }

    let args = arguments.as_object().cloned().unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                return Err(ToolError::InvalidParams(format!(
                    "Missing required field: {}",
                    field
                ))
                .into());
            }
        }
    }

    let mut coerced = args.clone();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let Some(value) = args.get(name) else { continue };
            let Some(declared) = prop_schema.get("type") else {
                continue;
            };
            coerced.insert(name.clone(), coerce_value(name, declared, value)?);
        }
    }

    Ok(Value::Object(coerced))
}

/// Coerce one value to its declared schema type
fn coerce_value(name: &str, declared: &Value, value: &Value) -> Result<Value> {
    if value.is_null() {
        let allows_null = match declared {
            Value::String(t) => t == "null",
            Value::Array(types) => types.iter().any(|t| t.as_str() == Some("null")),
            _ => false,
        };
        return if allows_null {
            Ok(Value::Null)
        } else {
            Err(invalid(name, "cannot be null"))
        };
    }

    // Union types other than the null case pass through unvalidated
    let Value::String(type_name) = declared else {
        return Ok(value.clone());
    };

    match type_name.as_str() {
        "string" => Ok(match value {
            Value::String(_) => value.clone(),
            other => Value::String(stringify(other)),
        }),
        "number" => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(name, "must be a number")),
            _ => Err(invalid(name, "must be a number")),
        },
        "integer" => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            // Fractional numbers truncate toward zero
            Value::Number(n) => Ok(Value::from(n.as_f64().unwrap_or(0.0) as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid(name, "must be an integer")),
            _ => Err(invalid(name, "must be an integer")),
        },
        "boolean" => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid(name, "must be a boolean")),
            },
            _ => Err(invalid(name, "must be a boolean")),
        },
        "array" => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::String(s) if s.trim_start().starts_with('[') => {
                serde_json::from_str(s).map_err(|_| invalid(name, "must be an array"))
            }
            _ => Err(invalid(name, "must be an array")),
        },
        "object" => match value {
            Value::Object(_) => Ok(value.clone()),
            Value::String(s) if s.trim_start().starts_with('{') => {
                serde_json::from_str(s).map_err(|_| invalid(name, "must be an object"))
            }
            _ => Err(invalid(name, "must be an object")),
        },
        _ => Ok(value.clone()),
    }
}

fn invalid(name: &str, reason: &str) -> crate::error::Error {
    ToolError::InvalidParams(format!("Field {} {}", name, reason)).into()
}
