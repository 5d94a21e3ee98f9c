//! Node Values
//!
//! The closed set of values a node can hold, and the fixed conversions
//! between them. Conversions that have no sensible result fail with
//! `CoreError::Validation` instead of producing NaN or lossy garbage.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Discriminant of a [`NodeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Json,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Json => "json",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged node value.
///
/// Serialized adjacently tagged (`{"kind":"string","value":"..."}`) so the
/// stored form keeps the variant even when the payload is ambiguous
/// (a JSON string blob vs. a plain string).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NodeValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl NodeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            NodeValue::Null => ValueKind::Null,
            NodeValue::Bool(_) => ValueKind::Bool,
            NodeValue::Number(_) => ValueKind::Number,
            NodeValue::String(_) => ValueKind::String,
            NodeValue::Json(_) => ValueKind::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NodeValue::Null)
    }

    /// Whether a path may continue below a node holding this value.
    ///
    /// Only null (structural) nodes and JSON objects can have children.
    pub fn is_descendable(&self) -> bool {
        match self {
            NodeValue::Null => true,
            NodeValue::Json(json) => json.is_object(),
            _ => false,
        }
    }

    /// Reject values that cannot be stored faithfully.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            NodeValue::Number(n) if !n.is_finite() => Err(CoreError::validation(format!(
                "non-finite number {} cannot be stored",
                n
            ))),
            _ => Ok(()),
        }
    }

    /// Convert to a number.
    pub fn to_number(&self) -> CoreResult<f64> {
        match self {
            NodeValue::Number(n) => Ok(*n),
            NodeValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            NodeValue::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| {
                    CoreError::validation(format!("string {:?} is not a number", s))
                }),
            NodeValue::Json(serde_json::Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| CoreError::validation("json number out of range")),
            other => Err(unsupported(other.kind(), "number")),
        }
    }

    /// Convert to text. This is the content written to a file on export.
    pub fn to_text(&self) -> CoreResult<String> {
        match self {
            NodeValue::String(s) => Ok(s.clone()),
            NodeValue::Bool(b) => Ok(b.to_string()),
            NodeValue::Number(n) => Ok(format_number(*n)),
            NodeValue::Json(json) => Ok(serde_json::to_string_pretty(json)?),
            NodeValue::Null => Err(unsupported(ValueKind::Null, "string")),
        }
    }

    /// Convert to a boolean.
    pub fn to_bool(&self) -> CoreResult<bool> {
        match self {
            NodeValue::Bool(b) => Ok(*b),
            NodeValue::Number(n) => Ok(*n != 0.0),
            NodeValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(CoreError::validation(format!(
                    "string {:?} is not a boolean",
                    s
                ))),
            },
            NodeValue::Json(serde_json::Value::Bool(b)) => Ok(*b),
            other => Err(unsupported(other.kind(), "bool")),
        }
    }

    /// Convert to a JSON value. Every storable value has a JSON form.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        match self {
            NodeValue::Null => Ok(serde_json::Value::Null),
            NodeValue::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            NodeValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CoreError::validation(format!("non-finite number {}", n))),
            NodeValue::String(s) => Ok(serde_json::Value::String(s.clone())),
            NodeValue::Json(json) => Ok(json.clone()),
        }
    }
}

fn unsupported(from: ValueKind, to: &str) -> CoreError {
    CoreError::validation(format!("cannot convert {} to {}", from, to))
}

/// Integral numbers print without a fractional part (`3`, not `3.0`).
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::String(value.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(value: String) -> Self {
        NodeValue::String(value)
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        NodeValue::Bool(value)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        NodeValue::Number(value)
    }
}

impl From<i64> for NodeValue {
    fn from(value: i64) -> Self {
        NodeValue::Number(value as f64)
    }
}

impl From<serde_json::Value> for NodeValue {
    fn from(value: serde_json::Value) -> Self {
        NodeValue::Json(value)
    }
}
