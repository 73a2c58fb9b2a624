use crate::protocol::Provider;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path that caused the error (e.g., "request.messages", "choices[0].message.tool_calls[1]")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "claude_adapter", "registry")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the transcoder.
///
/// Every predictable failure of a transformation is one of these variants;
/// nothing in the engine panics on bad input.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Unsupported provider: '{provider}'{}", .hint.as_ref().map(|h| format!(" (hint: {})", h)).unwrap_or_default())]
    UnsupportedProvider {
        provider: String,
        hint: Option<String>,
    },

    #[error("Unsupported capability for {provider}: {capability}{}", format_context(.context))]
    UnsupportedCapability {
        provider: Provider,
        capability: String,
        context: ErrorContext,
    },

    #[error("Malformed payload: {message}{}", format_context(.context))]
    MalformedPayload {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_with_context(msg, ErrorContext::new())
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::malformed_with_context(msg, ErrorContext::new())
    }

    /// Create a new malformed-payload error with structured context
    pub fn malformed_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::MalformedPayload {
            message: msg.into(),
            context,
        }
    }

    pub fn unsupported_capability(
        provider: Provider,
        capability: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Error::UnsupportedCapability {
            provider,
            capability: capability.into(),
            context,
        }
    }

    pub fn unsupported_provider(provider: impl Into<String>) -> Self {
        Error::UnsupportedProvider {
            provider: provider.into(),
            hint: None,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Attach an actionable hint to an `UnsupportedProvider` error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        if let Error::UnsupportedProvider { hint: ref mut h, .. } = self {
            *h = Some(hint.into());
        }
        self
    }

    /// Stable snake-case tag for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::UnsupportedProvider { .. } => "unsupported_provider",
            Error::UnsupportedCapability { .. } => "unsupported_capability",
            Error::MalformedPayload { .. } => "malformed_payload",
            Error::Configuration { .. } => "configuration_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Validation { context, .. }
            | Error::UnsupportedCapability { context, .. }
            | Error::MalformedPayload { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}
