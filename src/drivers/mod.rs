//! Provider 适配层：每家厂商一个适配器，经由统一中间表示 (IR) 互相转换
//!
//! Provider adapter layer. Each provider has one adapter implementing the
//! typed [`ProviderAdapter`] contract over its own wire types; every adapter is
//! also a [`ProviderDriver`], the object-safe JSON view the registry stores as
//! `Arc<dyn ProviderDriver>`.
//!
//! Converting provider A to provider B is always `A → IR → B`, so adding a
//! provider means writing one adapter, not one converter per pair.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::error_code::ErrorClass;
use crate::pipeline::StreamSession;
use crate::protocol::Provider;
use crate::types::{StreamEvent, UnifiedError, UnifiedRequest, UnifiedResponse};
use crate::{Error, ErrorContext, Result};

pub use anthropic::ClaudeAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

/// Typed conversion contract for one provider.
///
/// All entry points are pure: they read their input and build a fresh output,
/// with no state outside the explicitly threaded [`StreamSession`].
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    type Request: Serialize + DeserializeOwned;
    type Response: Serialize + DeserializeOwned;
    type Chunk: Serialize + DeserializeOwned;

    const PROVIDER: Provider;

    /// Structural preconditions on a native request.
    fn validate(&self, request: &Self::Request) -> Result<()>;

    /// Native request → IR. Runs [`validate`](Self::validate) first.
    fn to_ir(&self, request: Self::Request) -> Result<UnifiedRequest>;

    /// IR → native request, degrading capabilities the provider lacks.
    fn from_ir(&self, request: &UnifiedRequest) -> Result<Self::Request>;

    fn response_to_ir(&self, response: Self::Response) -> Result<UnifiedResponse>;

    fn response_from_ir(&self, response: &UnifiedResponse) -> Result<Self::Response>;

    /// Decode one native stream chunk into IR events.
    fn chunk_to_ir(
        &self,
        chunk: Self::Chunk,
        session: &mut StreamSession,
    ) -> Result<Vec<StreamEvent>>;

    /// Encode one IR event into zero or more native chunks.
    ///
    /// The session has already observed `event` when this is called.
    fn chunk_from_ir(
        &self,
        event: &StreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<Self::Chunk>>;
}

/// Object-safe view of an adapter over `serde_json::Value` payloads.
pub trait ProviderDriver: Send + Sync + fmt::Debug {
    fn provider(&self) -> Provider;

    fn validate_payload(&self, request: &Value) -> Result<()>;

    fn request_to_ir(&self, request: &Value) -> Result<UnifiedRequest>;

    fn request_from_ir(&self, request: &UnifiedRequest) -> Result<Value>;

    fn decode_response(&self, response: &Value) -> Result<UnifiedResponse>;

    fn encode_response(&self, response: &UnifiedResponse) -> Result<Value>;

    fn decode_chunk(&self, chunk: &Value, session: &mut StreamSession)
        -> Result<Vec<StreamEvent>>;

    fn encode_event(&self, event: &StreamEvent, session: &mut StreamSession)
        -> Result<Vec<Value>>;
}

impl<A: ProviderAdapter> ProviderDriver for A {
    fn provider(&self) -> Provider {
        A::PROVIDER
    }

    fn validate_payload(&self, request: &Value) -> Result<()> {
        let request: A::Request = decode_payload(A::PROVIDER, "request", request)?;
        ProviderAdapter::validate(self, &request)
    }

    fn request_to_ir(&self, request: &Value) -> Result<UnifiedRequest> {
        let request: A::Request = decode_payload(A::PROVIDER, "request", request)?;
        ProviderAdapter::to_ir(self, request)
    }

    fn request_from_ir(&self, request: &UnifiedRequest) -> Result<Value> {
        encode_payload(&ProviderAdapter::from_ir(self, request)?)
    }

    fn decode_response(&self, response: &Value) -> Result<UnifiedResponse> {
        let response: A::Response = decode_payload(A::PROVIDER, "response", response)?;
        ProviderAdapter::response_to_ir(self, response)
    }

    fn encode_response(&self, response: &UnifiedResponse) -> Result<Value> {
        encode_payload(&ProviderAdapter::response_from_ir(self, response)?)
    }

    fn decode_chunk(
        &self,
        chunk: &Value,
        session: &mut StreamSession,
    ) -> Result<Vec<StreamEvent>> {
        let chunk: A::Chunk = decode_payload(A::PROVIDER, "stream chunk", chunk)?;
        ProviderAdapter::chunk_to_ir(self, chunk, session)
    }

    fn encode_event(
        &self,
        event: &StreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<Value>> {
        ProviderAdapter::chunk_from_ir(self, event, session)?
            .iter()
            .map(encode_payload)
            .collect()
    }
}

/// Decode a JSON value into a provider wire type.
pub(crate) fn decode_payload<T: DeserializeOwned>(
    provider: Provider,
    what: &str,
    value: &Value,
) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        Error::malformed_with_context(
            format!("payload is not a valid {} {}", provider, what),
            ErrorContext::new()
                .with_details(e.to_string())
                .with_source(format!("{}_adapter", provider)),
        )
    })
}

pub(crate) fn encode_payload<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Fresh identifier `<prefix><uuid>` for ids the source did not supply.
pub(crate) fn synthesize_id(prefix: &str) -> String {
    format!("{}{}", prefix, uuid::Uuid::new_v4().simple())
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Normalize a provider error body.
///
/// The class is recovered from the type string, then the code, then the HTTP
/// status. An unclassifiable type string is kept verbatim.
pub(crate) fn normalize_error(
    raw_type: Option<&str>,
    code: Option<String>,
    http_status: Option<u16>,
    message: impl Into<String>,
    param: Option<String>,
) -> UnifiedError {
    let class = [raw_type, code.as_deref()]
        .into_iter()
        .flatten()
        .map(ErrorClass::from_provider_code)
        .find(|c| *c != ErrorClass::Unknown)
        .or_else(|| {
            http_status
                .map(ErrorClass::from_http_status)
                .filter(|c| *c != ErrorClass::Unknown)
        })
        .unwrap_or(ErrorClass::Unknown);
    let error_type = match (class, raw_type) {
        (ErrorClass::Unknown, Some(raw)) if !raw.is_empty() => raw.to_string(),
        _ => class.type_name().to_string(),
    };
    UnifiedError {
        error_type,
        message: message.into(),
        code,
        param,
    }
}

/// Render executed code or its output as a fenced block.
pub(crate) fn fenced(language: &str, body: &str) -> String {
    let lang = language.to_ascii_lowercase();
    let lang = if lang.is_empty() || lang == "language_unspecified" {
        ""
    } else {
        lang.as_str()
    };
    format!("```{}\n{}\n```", lang, body.trim_end_matches('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai::ChatCompletionRequest;
    use serde_json::json;

    #[test]
    fn test_decode_failure_is_malformed() {
        let err = decode_payload::<ChatCompletionRequest>(
            Provider::OpenAi,
            "request",
            &json!({"model": 42}),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");
        assert!(err.to_string().contains("openai request"));
    }

    #[test]
    fn test_normalize_error_fallbacks() {
        let e = normalize_error(Some("weird_type"), None, Some(429), "x", None);
        assert_eq!(e.error_type, "rate_limit_error");

        let e = normalize_error(Some("weird_type"), None, None, "x", None);
        assert_eq!(e.error_type, "weird_type");

        let e = normalize_error(None, Some("RESOURCE_EXHAUSTED".into()), None, "x", None);
        assert_eq!(e.error_type, "rate_limit_error");
        assert_eq!(e.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn test_synthesized_ids_are_unique() {
        let a = synthesize_id("call_");
        let b = synthesize_id("call_");
        assert!(a.starts_with("call_"));
        assert_eq!(a.len(), "call_".len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fenced() {
        assert_eq!(fenced("PYTHON", "print(1)\n"), "```python\nprint(1)\n```");
        assert_eq!(fenced("", "ok"), "```\nok\n```");
    }
}
