//! Tool declaration and function-call result types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Whether a tool only reads state or may change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    ReadOnly,
    Mutating,
}

impl ToolAccess {
    pub fn is_read_only(self) -> bool {
        matches!(self, ToolAccess::ReadOnly)
    }
}

/// Schema for a function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: Value,
}

/// Outcome of executing one function call.
///
/// `response` is always a JSON object containing at least `success`.
/// Failures carry an `error` string; successes carry tool-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub name: String,
    pub response: Value,
}

impl FunctionCallResult {
    /// Successful result. Object fields of `data` are merged next to `success`;
    /// any other value is stored under `result`.
    pub fn success(name: impl Into<String>, data: Value) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(true));
        match data {
            Value::Object(fields) => {
                for (k, v) in fields {
                    if k != "success" {
                        map.insert(k, v);
                    }
                }
            }
            Value::Null => {}
            other => {
                map.insert("result".to_string(), other);
            }
        }
        Self {
            name: name.into(),
            response: Value::Object(map),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: json!({ "success": false, "error": error.into() }),
        }
    }

    /// Response for a call the engine deliberately did not execute.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: json!({ "success": false, "skipped": true, "error": reason.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.response
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_skipped(&self) -> bool {
        self.response
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `error` field, if present.
    pub fn error(&self) -> Option<&str> {
        self.response.get("error").and_then(Value::as_str)
    }
}
