//! 请求结构校验：各适配器在字段映射之前共享的前置检查。
//!
//! Structural checks shared by the adapters' `validate` entry points.

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::{Error, ErrorContext, Result};

pub(crate) fn fail(msg: impl Into<String>, path: impl Into<String>, source: &str) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(path)
            .with_source(source),
    )
}

pub(crate) fn require_model(model: Option<&str>, source: &str) -> Result<()> {
    match model {
        Some(m) if !m.trim().is_empty() => Ok(()),
        _ => Err(fail("model is required", "request.model", source)),
    }
}

pub(crate) fn require_messages(count: usize, path: &str, source: &str) -> Result<()> {
    if count == 0 {
        return Err(fail("messages cannot be empty", path, source));
    }
    Ok(())
}

/// Inclusive range check on an optional sampling parameter.
pub(crate) fn check_range(
    value: Option<f64>,
    min: f64,
    max: f64,
    path: &str,
    source: &str,
) -> Result<()> {
    if let Some(v) = value {
        if !v.is_finite() || v < min || v > max {
            return Err(Error::validation_with_context(
                format!("value out of range [{}, {}]", min, max),
                ErrorContext::new()
                    .with_field_path(path)
                    .with_details(format!("got {}", v))
                    .with_source(source),
            ));
        }
    }
    Ok(())
}

/// Compile a JSON Schema (Draft 7) to make sure it is usable.
pub(crate) fn check_schema(schema: &Value, path: &str, source: &str) -> Result<()> {
    if !schema.is_object() && !schema.is_boolean() {
        return Err(fail("schema must be a JSON object", path, source));
    }
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map(|_| ())
        .map_err(|e| {
            Error::validation_with_context(
                "invalid JSON Schema",
                ErrorContext::new()
                    .with_field_path(path)
                    .with_details(e.to_string())
                    .with_source(source),
            )
        })
}
