//! 统一中间表示（IR）：所有厂商适配器都经由这里互相转换。
//!
//! # Unified Intermediate Representation
//!
//! This module defines the provider-neutral request/response model. Every
//! adapter converts its wire format into these types and back, so converting
//! provider A to provider B is always `A → IR → B`.
//!
//! ## Invariants
//!
//! - Message order is conversation order and is never rearranged.
//! - A message carries either flat text or an ordered list of parts, never
//!   both (see [`MessageContent`]).
//! - Tool-call arguments are a key-unique JSON object, never a raw string.
//! - `UnifiedUsage::total_tokens == prompt_tokens + completion_tokens`, and the
//!   cache/reasoning counts are breakdowns contained in those figures.
//! - A response carries either choices or an error, never both.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`UnifiedRequest`] | Chat request with generation controls and tools |
//! | [`UnifiedMessage`] | One conversation turn |
//! | [`UnifiedMessagePart`] | Text / image / file / document part |
//! | [`UnifiedTool`] | Tool declaration, including built-in tools |
//! | [`UnifiedToolCall`] | Assistant tool invocation |
//! | [`UnifiedResponse`] | Response with choices, usage or error |
//! | [`StreamEvent`] | One incremental streaming event |

pub mod events;
pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use events::StreamEvent;
pub use message::{MediaSource, MessageContent, Role, UnifiedMessage, UnifiedMessagePart};
pub use request::{ReasoningConfig, ReasoningEffort, ResponseFormat, UnifiedRequest};
pub use response::{FinishReason, UnifiedChoice, UnifiedError, UnifiedResponse, UnifiedUsage};
pub use tool::{
    BuiltinTool, JsonPayload, ToolArguments, ToolChoice, UnifiedTool, UnifiedToolCall,
};
