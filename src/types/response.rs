//! Unified chat response

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::UnifiedMessage;
use crate::error::{Error, ErrorContext};
use crate::error_code::ErrorClass;
use crate::protocol::Provider;
use crate::Result;

/// Canonical reason a model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

impl FinishReason {
    pub const ALL: [FinishReason; 4] = [
        FinishReason::Stop,
        FinishReason::Length,
        FinishReason::ToolCalls,
        FinishReason::ContentFilter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
        }
    }
}

/// Token accounting.
///
/// `prompt_tokens` and `completion_tokens` are inclusive figures: cache reads
/// and writes are part of the prompt, reasoning is part of the completion.
/// The optional sub-counts break those figures down and never add to them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnifiedUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl UnifiedUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
            ..Default::default()
        }
    }

    /// Set the cache breakdown, clamped so cache tokens never exceed the prompt.
    pub fn with_cache(mut self, read: Option<u64>, write: Option<u64>) -> Self {
        let read = read.map(|r| r.min(self.prompt_tokens));
        let room = self.prompt_tokens - read.unwrap_or(0);
        self.cache_read_tokens = read;
        self.cache_write_tokens = write.map(|w| w.min(room));
        self
    }

    /// Set the reasoning breakdown, clamped to the completion figure.
    pub fn with_reasoning(mut self, reasoning: Option<u64>) -> Self {
        self.reasoning_tokens = reasoning.map(|r| r.min(self.completion_tokens));
        self
    }

    /// Fold a provider-reported total into the figures.
    ///
    /// A total larger than prompt + completion (e.g. tool-use prompt tokens
    /// reported only in the total) is attributed to the prompt. The total is
    /// then recomputed so the sum always holds. Sums saturate at `u64::MAX`.
    pub fn reconcile_total(mut self, reported_total: Option<u64>) -> Self {
        let sum = self.prompt_tokens.saturating_add(self.completion_tokens);
        if let Some(total) = reported_total {
            if total > sum {
                self.prompt_tokens = self.prompt_tokens.saturating_add(total - sum);
            }
        }
        self.total_tokens = self.prompt_tokens.saturating_add(self.completion_tokens);
        self
    }

    /// Prompt tokens that were neither read from nor written to the cache.
    pub fn uncached_prompt_tokens(&self) -> u64 {
        self.prompt_tokens
            .saturating_sub(self.cache_read_tokens.unwrap_or(0))
            .saturating_sub(self.cache_write_tokens.unwrap_or(0))
    }

    /// Completion tokens excluding reasoning.
    pub fn visible_completion_tokens(&self) -> u64 {
        self.completion_tokens
            .saturating_sub(self.reasoning_tokens.unwrap_or(0))
    }

    pub fn is_consistent(&self) -> bool {
        let sum = self.prompt_tokens.saturating_add(self.completion_tokens);
        let breakdown = self
            .cache_read_tokens
            .unwrap_or(0)
            .saturating_add(self.cache_write_tokens.unwrap_or(0))
            .saturating_add(self.reasoning_tokens.unwrap_or(0));
        self.total_tokens == sum && breakdown <= sum
    }
}

/// Provider error body in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedError {
    /// Canonical `type` string, see [`ErrorClass::type_name`].
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl UnifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            error_type: class.type_name().to_string(),
            message: message.into(),
            code: None,
            param: None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match ErrorClass::from_provider_code(&self.error_type) {
            ErrorClass::Unknown => self
                .code
                .as_deref()
                .map(ErrorClass::from_provider_code)
                .unwrap_or(ErrorClass::Unknown),
            class => class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedChoice {
    pub index: u32,
    pub message: UnifiedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

impl UnifiedChoice {
    pub fn new(index: u32, message: UnifiedMessage, finish_reason: Option<FinishReason>) -> Self {
        Self {
            index,
            message,
            finish_reason,
            logprobs: None,
        }
    }
}

/// Provider-neutral response: either choices or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub id: String,
    pub provider: Provider,
    pub model: String,
    /// Unix seconds, when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default)]
    pub choices: Vec<UnifiedChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UnifiedUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnifiedError>,
}

impl UnifiedResponse {
    pub fn success(
        id: impl Into<String>,
        provider: Provider,
        model: impl Into<String>,
        choices: Vec<UnifiedChoice>,
    ) -> Self {
        Self {
            id: id.into(),
            provider,
            model: model.into(),
            created: None,
            choices,
            usage: None,
            error: None,
        }
    }

    pub fn failure(provider: Provider, error: UnifiedError) -> Self {
        Self {
            id: String::new(),
            provider,
            model: String::new(),
            created: None,
            choices: Vec::new(),
            usage: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.error.is_some() && !self.choices.is_empty() {
            return Err(Error::validation_with_context(
                "a response carrying an error cannot have choices",
                ErrorContext::new()
                    .with_field_path("response.choices")
                    .with_source("ir_validator"),
            ));
        }
        if let Some(usage) = &self.usage {
            if !usage.is_consistent() {
                return Err(Error::validation_with_context(
                    "usage breakdown is inconsistent",
                    ErrorContext::new()
                        .with_field_path("response.usage")
                        .with_details(format!("{:?}", usage)),
                ));
            }
        }
        Ok(())
    }
}
