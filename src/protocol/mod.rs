//! 协议层：厂商标识、转换类型，以及三家厂商的线上数据结构。
//!
//! # Provider Wire Protocols
//!
//! This module holds the provider identifiers the engine dispatches on and the
//! serde definitions of each provider's request, response and stream-chunk
//! shapes. The wire types are deliberately permissive when decoding (defaults
//! everywhere, unknown content kinds tolerated) and compact when encoding
//! (absent optionals are skipped).
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`openai`] | Chat Completions request / response / chunk |
//! | [`anthropic`] | Claude Messages request / response / stream events |
//! | [`gemini`] | `generateContent` request / response (also used per stream chunk) |

pub mod anthropic;
pub mod gemini;
pub mod openai;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identifier of a supported provider wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Provider {
    /// Text-completion style (Chat Completions).
    #[serde(rename = "openai")]
    OpenAi,
    /// Content-parts style (`generateContent`).
    #[serde(rename = "gemini", alias = "google")]
    Gemini,
    /// Tool-use style (Messages).
    #[serde(rename = "claude", alias = "anthropic")]
    Claude,
}

impl Provider {
    pub fn all() -> [Provider; 3] {
        [Provider::OpenAi, Provider::Gemini, Provider::Claude]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Claude => "claude",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            "claude" | "anthropic" => Ok(Provider::Claude),
            other => Err(Error::unsupported_provider(other)
                .with_hint("known providers: openai, gemini, claude")),
        }
    }
}

/// Payload kind selected for a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Request,
    Response,
    #[serde(alias = "stream-chunk", alias = "stream", alias = "chunk")]
    StreamChunk,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Request => "request",
            TransformKind::Response => "response",
            TransformKind::StreamChunk => "stream-chunk",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" => Ok(TransformKind::Request),
            "response" => Ok(TransformKind::Response),
            "stream" | "chunk" | "stream-chunk" | "stream_chunk" => Ok(TransformKind::StreamChunk),
            other => Err(Error::validation(format!(
                "unknown transform kind '{}' (expected request, response or stream-chunk)",
                other
            ))),
        }
    }
}

/// Ordered (source, target) provider pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransformationPair {
    pub source: Provider,
    pub target: Provider,
}

impl TransformationPair {
    pub fn new(source: Provider, target: Provider) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for TransformationPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}
