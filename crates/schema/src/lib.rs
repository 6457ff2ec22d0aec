//! Connector configuration schema: compile a connector type's JSON schema once,
//! validate candidate payloads against it, and derive form defaults.

#![forbid(unsafe_code)]

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema compile: {0}")]
    Compile(String),
}

/// One schema violation, addressed by JSON pointer into the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationDetail {
    pub instance_path: String,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub details: Vec<ValidationDetail>,
}

impl ValidationReport {
    pub fn ok() -> Self { Self { valid: true, details: Vec::new() } }
}

/// Compiled schema for one connector type. A `null` schema accepts any object.
pub struct ConnectorSchema {
    raw: Value,
    compiled: Option<JSONSchema>,
}

impl std::fmt::Debug for ConnectorSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorSchema").field("raw", &self.raw).finish_non_exhaustive()
    }
}

impl ConnectorSchema {
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        if schema.is_null() {
            return Ok(Self { raw: Value::Null, compiled: None });
        }
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self { raw: schema.clone(), compiled: Some(compiled) })
    }

    pub fn raw(&self) -> &Value { &self.raw }

    pub fn validate(&self, data: &Value) -> ValidationReport {
        let Some(compiled) = &self.compiled else {
            return if data.is_object() {
                ValidationReport::ok()
            } else {
                ValidationReport {
                    valid: false,
                    details: vec![ValidationDetail { instance_path: String::new(), message: "configuration must be an object".into(), hint: None }],
                }
            };
        };
        let mut details: Vec<ValidationDetail> = Vec::new();
        if let Err(errors) = compiled.validate(data) {
            for err in errors {
                let message = err.to_string();
                details.push(ValidationDetail { instance_path: err.instance_path.to_string(), hint: hint_for(&message), message });
            }
        }
        debug!(issues = details.len(), "schema: validated payload");
        ValidationReport { valid: details.is_empty(), details }
    }

    /// Top-level required property names.
    pub fn required(&self) -> Vec<String> {
        self.raw
            .get("required")
            .and_then(|r| r.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// Object seeded with every `default` declared under `properties`, recursively.
    pub fn defaults(&self) -> Value {
        Value::Object(defaults_for(&self.raw, 0).unwrap_or_default())
    }
}

// Keep hints coarse; jsonschema message wording is not stable across versions.
fn hint_for(message: &str) -> Option<String> {
    if message.contains("required property") {
        Some("missing required field".into())
    } else if message.contains("is not of type") || message.contains("expected type") {
        Some("mismatched type".into())
    } else if message.contains("is not one of") || message.contains("enum") {
        Some("value not in allowed set".into())
    } else if message.contains("less than") || message.contains("greater than") {
        Some("value out of range".into())
    } else {
        None
    }
}

fn defaults_for(schema: &Value, depth: usize) -> Option<Map<String, Value>> {
    if depth > 4 { return None; }
    let props = schema.get("properties")?.as_object()?;
    let mut out = Map::new();
    for (k, v) in props.iter() {
        if let Some(d) = v.get("default") {
            out.insert(k.clone(), d.clone());
        } else if v.get("type").and_then(|t| t.as_str()) == Some("object") {
            if let Some(nested) = defaults_for(v, depth + 1) {
                if !nested.is_empty() { out.insert(k.clone(), Value::Object(nested)); }
            }
        }
    }
    Some(out)
}
