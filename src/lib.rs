//! # llm-transcode
//!
//! 大模型对话补全请求/响应/流式分片的跨厂商转码器：OpenAI、Gemini、Claude
//! 之间经由统一中间表示 (IR) 互相转换。
//!
//! Chat-completion transcoder for OpenAI, Gemini and Claude payloads.
//!
//! ## Overview
//!
//! Every provider has one adapter that converts its native request, response
//! and stream-chunk shapes to and from a provider-neutral intermediate
//! representation. Converting A to B is always `A → IR → B`:
//!
//! ```text
//!  openai ─┐                 ┌─ openai
//!  gemini ─┼─► Unified IR ──►┼─ gemini
//!  claude ─┘                 └─ claude
//! ```
//!
//! The engine does no I/O. Every transformation is a pure function of its
//! input, except streaming, where cross-chunk state lives in a
//! [`pipeline::StreamSession`] owned by the single stream it belongs to.
//!
//! ## Quick Start
//!
//! ```rust
//! use llm_transcode::{Provider, TransformKind, TransformationRegistry, TranscodeConfig};
//! use serde_json::json;
//!
//! let registry = TransformationRegistry::with_defaults(TranscodeConfig::default());
//! let claude = registry.transform(
//!     Provider::OpenAi,
//!     Provider::Claude,
//!     TransformKind::Request,
//!     &json!({
//!         "model": "gpt-4o",
//!         "messages": [
//!             {"role": "system", "content": "You are helpful."},
//!             {"role": "user", "content": "Hi"}
//!         ],
//!         "max_tokens": 50
//!     }),
//! )?;
//! assert_eq!(claude["system"], "You are helpful.");
//! # Ok::<(), llm_transcode::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Unified IR: requests, messages, tools, responses, stream events |
//! | [`protocol`] | Provider selectors and native wire types |
//! | [`drivers`] | One adapter per provider, typed and JSON-erased |
//! | [`registry`] | Provider → adapter table and transformation entry points |
//! | [`pipeline`] | Stream sessions, tool-call reassembly, stream transcoding |
//! | [`facade`] | String-in / JSON-envelope-out binding layer |
//! | [`config`] | Engine configuration |

pub mod config;
pub mod drivers;
pub mod error_code;
pub mod facade;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod types;
pub mod utils;

pub(crate) mod validation;

pub use config::TranscodeConfig;
pub use drivers::{ClaudeAdapter, GeminiAdapter, OpenAiAdapter, ProviderAdapter, ProviderDriver};
pub use pipeline::{transcode_stream, StreamSession, StreamTranscoder};
pub use protocol::{Provider, TransformKind, TransformationPair};
pub use registry::TransformationRegistry;
pub use types::{
    FinishReason, StreamEvent, UnifiedMessage, UnifiedRequest, UnifiedResponse, UnifiedToolCall,
    UnifiedUsage,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
