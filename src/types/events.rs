//! 流式事件：所有厂商的流式分片都先解码成这些事件，再由目标适配器重新编码。
//!
//! Provider-neutral stream events.
//!
//! Every source chunk decodes into zero or more events; the target adapter
//! re-encodes them. Tool-call indices are stable positions within the
//! assistant turn, not provider block indices.

use serde::{Deserialize, Serialize};

use super::response::{FinishReason, UnifiedError, UnifiedUsage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First event of a logical stream.
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    /// Partial tool call; `id` and `name` usually arrive only on the first delta.
    ToolCallDelta {
        index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    /// The tool call at `index` will receive no more deltas.
    ToolCallEnd {
        index: u32,
    },
    Finish {
        reason: FinishReason,
    },
    Usage {
        usage: UnifiedUsage,
    },
    Error {
        error: UnifiedError,
    },
    StreamEnd,
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta { text: text.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::StreamEnd)
    }

    pub fn tool_index(&self) -> Option<u32> {
        match self {
            StreamEvent::ToolCallDelta { index, .. } | StreamEvent::ToolCallEnd { index } => {
                Some(*index)
            }
            _ => None,
        }
    }
}
