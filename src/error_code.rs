//! 错误分类：在三家厂商的错误词汇之间做规范化映射。
//!
//! Canonical error classes for provider error bodies.
//!
//! Each provider reports failures in its own vocabulary: OpenAI and Claude use an
//! `error.type` string, Gemini uses a gRPC-style `error.status` plus an HTTP code.
//! [`ErrorClass`] is the shared pivot used by the adapters when an error body
//! travels through [`UnifiedError`](crate::types::UnifiedError).
//!
//! | Class | type string | Gemini status | HTTP |
//! |-------|-------------|---------------|------|
//! | InvalidRequest | `invalid_request_error` | `INVALID_ARGUMENT` | 400 |
//! | Authentication | `authentication_error` | `UNAUTHENTICATED` | 401 |
//! | PermissionDenied | `permission_error` | `PERMISSION_DENIED` | 403 |
//! | NotFound | `not_found_error` | `NOT_FOUND` | 404 |
//! | RequestTooLarge | `request_too_large` | `INVALID_ARGUMENT` | 413 |
//! | RateLimited | `rate_limit_error` | `RESOURCE_EXHAUSTED` | 429 |
//! | ServerError | `api_error` | `INTERNAL` | 500 |
//! | Overloaded | `overloaded_error` | `UNAVAILABLE` | 503 |
//! | Timeout | `timeout_error` | `DEADLINE_EXCEEDED` | 504 |
//! | Unknown | `api_error` | `UNKNOWN` | 500 |
//!
//! ## Example
//!
//! ```rust
//! use llm_transcode::error_code::ErrorClass;
//!
//! let class = ErrorClass::from_provider_code("RESOURCE_EXHAUSTED");
//! assert_eq!(class, ErrorClass::RateLimited);
//! assert_eq!(class.type_name(), "rate_limit_error");
//! assert_eq!(class.http_status(), 429);
//! ```

use std::fmt;

/// Canonical error class shared by all adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed request, invalid parameters, or missing required fields
    InvalidRequest,
    /// Invalid, expired, or missing API key
    Authentication,
    /// Valid credentials but insufficient permissions
    PermissionDenied,
    /// Requested model, endpoint, or resource does not exist
    NotFound,
    /// Input exceeds context window or payload size limit
    RequestTooLarge,
    /// Request rate limit or quota exceeded
    RateLimited,
    /// Internal server error on provider side
    ServerError,
    /// Provider service temporarily overloaded
    Overloaded,
    /// Request timed out before response received
    Timeout,
    /// Error could not be classified
    Unknown,
}

impl ErrorClass {
    /// `error.type` string used by OpenAI- and Claude-shaped error bodies.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request_error",
            Self::Authentication => "authentication_error",
            Self::PermissionDenied => "permission_error",
            Self::NotFound => "not_found_error",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limit_error",
            Self::ServerError => "api_error",
            Self::Overloaded => "overloaded_error",
            Self::Timeout => "timeout_error",
            Self::Unknown => "api_error",
        }
    }

    /// gRPC-style status string used by Gemini error bodies.
    #[inline]
    pub fn gemini_status(&self) -> &'static str {
        match self {
            Self::InvalidRequest | Self::RequestTooLarge => "INVALID_ARGUMENT",
            Self::Authentication => "UNAUTHENTICATED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RESOURCE_EXHAUSTED",
            Self::ServerError => "INTERNAL",
            Self::Overloaded => "UNAVAILABLE",
            Self::Timeout => "DEADLINE_EXCEEDED",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[inline]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::Authentication => 401,
            Self::PermissionDenied => 403,
            Self::NotFound => 404,
            Self::RequestTooLarge => 413,
            Self::RateLimited => 429,
            Self::ServerError | Self::Unknown => 500,
            Self::Overloaded => 503,
            Self::Timeout => 504,
        }
    }

    /// Maps any provider error type, code or status string to its class.
    ///
    /// Accepts the OpenAI/Claude `type` vocabulary, common OpenAI `code`
    /// values and Gemini status strings. Unrecognized strings are `Unknown`.
    pub fn from_provider_code(provider_code: &str) -> Self {
        match provider_code {
            "invalid_request_error" | "invalid_request" | "INVALID_ARGUMENT"
            | "FAILED_PRECONDITION" => Self::InvalidRequest,
            "authentication_error" | "invalid_api_key" | "UNAUTHENTICATED" => {
                Self::Authentication
            }
            "permission_error" | "permission_denied" | "PERMISSION_DENIED" => {
                Self::PermissionDenied
            }
            "not_found_error" | "model_not_found" | "NOT_FOUND" => Self::NotFound,
            "request_too_large" | "context_length_exceeded" => Self::RequestTooLarge,
            "rate_limit_error" | "rate_limit_exceeded" | "insufficient_quota"
            | "RESOURCE_EXHAUSTED" => Self::RateLimited,
            "api_error" | "server_error" | "INTERNAL" => Self::ServerError,
            "overloaded_error" | "UNAVAILABLE" => Self::Overloaded,
            "timeout_error" | "DEADLINE_EXCEEDED" => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Maps an HTTP status code to the most likely class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            503 | 529 => Self::Overloaded,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorClass; 9] = [
        ErrorClass::InvalidRequest,
        ErrorClass::Authentication,
        ErrorClass::PermissionDenied,
        ErrorClass::NotFound,
        ErrorClass::RequestTooLarge,
        ErrorClass::RateLimited,
        ErrorClass::ServerError,
        ErrorClass::Overloaded,
        ErrorClass::Timeout,
    ];

    #[test]
    fn test_type_name_recovers_class() {
        for class in ALL {
            assert_eq!(ErrorClass::from_provider_code(class.type_name()), class);
        }
    }

    #[test]
    fn test_gemini_status_mapping() {
        assert_eq!(
            ErrorClass::from_provider_code("RESOURCE_EXHAUSTED"),
            ErrorClass::RateLimited
        );
        assert_eq!(ErrorClass::Overloaded.gemini_status(), "UNAVAILABLE");
        assert_eq!(ErrorClass::from_provider_code("SOMETHING_NEW"), ErrorClass::Unknown);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorClass::from_http_status(529), ErrorClass::Overloaded);
        assert_eq!(ErrorClass::from_http_status(418), ErrorClass::Unknown);
        assert_eq!(ErrorClass::RateLimited.http_status(), 429);
    }
}
