//! Unified chat request

use serde::{Deserialize, Serialize};

use super::message::{Role, UnifiedMessage};
use super::tool::{JsonPayload, ToolChoice, UnifiedTool};
use crate::error::{Error, ErrorContext};
use crate::Result;

/// Provider-neutral chat request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub model: String,
    /// Conversation in turn order.
    pub messages: Vec<UnifiedMessage>,
    /// Extra system prompt supplied outside the message list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<UnifiedTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
}

impl UnifiedRequest {
    pub fn new(model: impl Into<String>, messages: Vec<UnifiedMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tools(mut self, tools: Vec<UnifiedTool>) -> Self {
        self.tools = tools;
        self
    }

    /// Structural checks on the IR itself.
    ///
    /// Used by `from_ir` entry points so that a hand-built IR is held to the
    /// same invariants an adapter's `to_ir` guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ir_error("model is required", "request.model"));
        }
        if self.messages.is_empty() {
            return Err(ir_error("messages cannot be empty", "request.messages"));
        }
        for (i, m) in self.messages.iter().enumerate() {
            if !m.tool_calls.is_empty() && m.role != Role::Assistant {
                return Err(ir_error(
                    "tool calls are only valid on assistant messages",
                    format!("request.messages[{}].tool_calls", i),
                ));
            }
            if m.tool_call_id.is_some() && m.role != Role::Tool {
                return Err(ir_error(
                    "tool_call_id is only valid on tool messages",
                    format!("request.messages[{}].tool_call_id", i),
                ));
            }
        }
        Ok(())
    }

    /// All system text: the `system` field first, then system-role messages in order.
    pub fn system_prompt(&self, separator: &str) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(s) = self.system.as_ref().filter(|s| !s.is_empty()) {
            parts.push(s.clone());
        }
        for m in self.messages.iter().filter(|m| m.role == Role::System) {
            let text = m.text();
            if !text.is_empty() {
                parts.push(text);
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(separator))
        }
    }

    /// Messages other than system turns, in order.
    pub fn conversation(&self) -> impl Iterator<Item = &UnifiedMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

fn ir_error(msg: &str, path: impl Into<String>) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(path)
            .with_source("ir_validator"),
    )
}

/// Structured-output request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        schema: JsonPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strict: Option<bool>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }

    /// Parse an OpenAI `reasoning_effort` value (`minimal` counts as low).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" | "low" => Some(ReasoningEffort::Low),
            "medium" => Some(ReasoningEffort::Medium),
            "high" => Some(ReasoningEffort::High),
            _ => None,
        }
    }

    pub fn from_budget(budget_tokens: u32) -> Self {
        if budget_tokens <= 1024 {
            ReasoningEffort::Low
        } else if budget_tokens <= 8192 {
            ReasoningEffort::Medium
        } else {
            ReasoningEffort::High
        }
    }

    pub fn budget_tokens(&self) -> u32 {
        match self {
            ReasoningEffort::Low => 1024,
            ReasoningEffort::Medium => 8192,
            ReasoningEffort::High => 24576,
        }
    }
}

/// Extended thinking controls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ReasoningConfig {
    pub fn effective_budget(&self) -> Option<u32> {
        self.budget_tokens
            .or_else(|| self.effort.map(|e| e.budget_tokens()))
    }

    pub fn effective_effort(&self) -> Option<ReasoningEffort> {
        self.effort
            .or_else(|| self.budget_tokens.map(ReasoningEffort::from_budget))
    }
}
