//! String-typed binding layer.
//!
//! Takes provider/kind selectors and a JSON document as strings and returns a
//! `{success, result?, error?}` envelope. Language bindings and the CLI sit on
//! top of this; the engine itself works on decoded values.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::protocol::{Provider, TransformKind};
use crate::registry::TransformationRegistry;
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FacadeResponse {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to encode response"}"#.to_string()
        })
    }
}

fn parse_document(payload: &str) -> Result<serde_json::Value> {
    serde_json::from_str(payload).map_err(|e| {
        Error::malformed_with_context(
            "payload is not valid JSON",
            ErrorContext::new().with_details(e.to_string()),
        )
    })
}

fn guarded<F>(f: F) -> FacadeResponse
where
    F: FnOnce() -> Result<String>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(result)) => FacadeResponse::ok(result),
        Ok(Err(e)) => FacadeResponse::failure(e.to_string()),
        Err(_) => {
            tracing::error!("transformation engine panicked");
            FacadeResponse::failure("internal error: transformation engine panicked")
        }
    }
}

/// Transform a JSON document; `kind` accepts `request`, `response` or `stream-chunk`.
pub fn transform_json(
    registry: &TransformationRegistry,
    source: &str,
    target: &str,
    kind: &str,
    payload: &str,
) -> FacadeResponse {
    guarded(|| {
        let source: Provider = source.parse()?;
        let target: Provider = target.parse()?;
        let kind: TransformKind = kind.parse()?;
        let payload = parse_document(payload)?;
        let out = registry.transform(source, target, kind, &payload)?;
        Ok(serde_json::to_string(&out)?)
    })
}

/// Validate a native request; `result` is `"valid"` on success.
pub fn validate_json(registry: &TransformationRegistry, provider: &str, payload: &str) -> FacadeResponse {
    guarded(|| {
        let provider: Provider = provider.parse()?;
        let payload = parse_document(payload)?;
        registry.validate(provider, &payload)?;
        Ok("valid".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranscodeConfig;

    fn registry() -> TransformationRegistry {
        TransformationRegistry::with_defaults(TranscodeConfig::default())
    }

    #[test]
    fn test_transform_json_success() {
        let resp = transform_json(
            &registry(),
            "openai",
            "anthropic",
            "request",
            r#"{"model":"gpt-4o","messages":[{"role":"user","content":"Hi"}],"max_tokens":50}"#,
        );
        assert!(resp.success, "{:?}", resp.error);
        let out: serde_json::Value = serde_json::from_str(resp.result.as_deref().unwrap()).unwrap();
        assert_eq!(out["max_tokens"], 50);
        assert_eq!(out["messages"][0]["content"], "Hi");
    }

    #[test]
    fn test_failures_are_reported_not_raised() {
        let reg = registry();
        let resp = transform_json(&reg, "openai", "mistral", "request", "{}");
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("mistral"));

        let resp = transform_json(&reg, "openai", "gemini", "request", "not json");
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("Malformed payload"));

        let err = parse_document("{\"model\":").unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");
        let resp = validate_json(&reg, "claude", "[1,");
        assert!(resp.error.unwrap().starts_with("Malformed payload"));

        let resp = validate_json(&reg, "openai", r#"{"model":"gpt-4o","messages":[]}"#);
        assert!(!resp.success);
        assert!(resp.to_json().contains("\"success\":false"));
    }

    #[test]
    fn test_panics_become_failures() {
        let resp = guarded(|| panic!("boom"));
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("panicked"));
    }
}
