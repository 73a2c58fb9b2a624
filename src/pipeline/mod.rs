//! 流式处理模块：流会话状态、分片转码器以及 futures 流适配。
//!
//! # Stream Pipeline
//!
//! A streamed response is transcoded one chunk at a time:
//!
//! ```text
//! source chunk → source.decode_chunk → StreamEvent* → session.observe → target.encode_event → target chunk*
//!                        │                                  │                    │
//!                   decoder scratch                  tool-call accumulator   encoder scratch
//! ```
//!
//! All cross-chunk state lives in one [`StreamSession`] owned by the stream it
//! belongs to. Sessions are never shared: a [`StreamTranscoder`] owns its
//! session outright, and dropping the transcoder is how a caller cancels.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`StreamSession`] | Per-stream state: tool-call accumulator, aggregated text, finish, usage |
//! | [`StreamTranscoder`] | Source/target driver pair plus its owned session |
//! | [`transcode_stream`] | Adapts a `futures` stream of source chunks |
//! | [`accumulate`] | Tool-call reassembly keyed by index |

pub mod accumulate;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::drivers::ProviderDriver;
use crate::protocol::Provider;
use crate::types::{FinishReason, StreamEvent, UnifiedError, UnifiedToolCall, UnifiedUsage};
use crate::Result;

pub use accumulate::{PartialToolCall, ToolCallAccumulator};

/// Scratch state used while decoding source chunks.
#[derive(Debug, Clone, Default)]
pub(crate) struct DecoderState {
    pub message_id: Option<String>,
    pub model: Option<String>,
    pub started: bool,
    /// Claude content-block index → tool index.
    pub block_tools: BTreeMap<u32, u32>,
    pub next_tool: u32,
    pub saw_tool_call: bool,
    /// Prompt-side usage announced before the final usage report.
    pub usage_base: Option<UnifiedUsage>,
}

impl DecoderState {
    pub fn allocate_tool(&mut self) -> u32 {
        let index = self.next_tool;
        self.next_tool += 1;
        self.saw_tool_call = true;
        index
    }
}

/// Kind of the Claude content block currently open on the encoder side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenBlock {
    Text,
    Thinking,
    Tool(u32),
}

/// Scratch state used while encoding target chunks.
#[derive(Debug, Clone, Default)]
pub(crate) struct EncoderState {
    pub started: bool,
    pub id: String,
    pub model: String,
    pub created: i64,
    /// (block index, kind) of the open Claude block.
    pub open_block: Option<(u32, OpenBlock)>,
    pub next_block: u32,
    /// Tool indices already flushed as whole calls.
    pub emitted_tools: BTreeSet<u32>,
    pub finish: Option<FinishReason>,
    pub stopped: bool,
}

/// State of one logical stream.
///
/// Created when a stream begins and dropped when it ends. Besides the
/// tool-call accumulator it keeps the aggregated text, reasoning, finish
/// reason and latest usage so callers can inspect the stream so far.
#[derive(Debug, Clone, Default)]
pub struct StreamSession {
    accumulator: ToolCallAccumulator,
    text: String,
    reasoning: String,
    finish_reason: Option<FinishReason>,
    usage: Option<UnifiedUsage>,
    error: Option<UnifiedError>,
    ended: bool,
    pub(crate) decoder: DecoderState,
    pub(crate) encoder: EncoderState,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one IR event into the session.
    pub fn observe(&mut self, event: &StreamEvent) {
        self.accumulator.observe(event);
        match event {
            StreamEvent::MessageStart { id, model } => {
                if self.decoder.message_id.is_none() {
                    self.decoder.message_id = id.clone();
                }
                if self.decoder.model.is_none() {
                    self.decoder.model = model.clone();
                }
            }
            StreamEvent::TextDelta { text } => self.text.push_str(text),
            StreamEvent::ReasoningDelta { text } => self.reasoning.push_str(text),
            StreamEvent::Finish { reason } => self.finish_reason = Some(*reason),
            StreamEvent::Usage { usage } => self.usage = Some(usage.clone()),
            StreamEvent::Error { error } => self.error = Some(error.clone()),
            StreamEvent::StreamEnd => self.ended = true,
            StreamEvent::ToolCallDelta { .. } | StreamEvent::ToolCallEnd { .. } => {}
        }
    }

    pub fn accumulator(&self) -> &ToolCallAccumulator {
        &self.accumulator
    }

    /// Completed tool calls in index order.
    pub fn tool_calls(&self) -> Result<Vec<UnifiedToolCall>> {
        self.accumulator.completed()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn usage(&self) -> Option<&UnifiedUsage> {
        self.usage.as_ref()
    }

    pub fn error(&self) -> Option<&UnifiedError> {
        self.error.as_ref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.decoder.message_id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.decoder.model.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

/// Converts one stream from a source provider's chunks to a target's.
pub struct StreamTranscoder {
    source: Arc<dyn ProviderDriver>,
    target: Arc<dyn ProviderDriver>,
    session: StreamSession,
}

impl fmt::Debug for StreamTranscoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTranscoder")
            .field("source", &self.source.provider())
            .field("target", &self.target.provider())
            .field("session", &self.session)
            .finish()
    }
}

impl StreamTranscoder {
    pub fn new(source: Arc<dyn ProviderDriver>, target: Arc<dyn ProviderDriver>) -> Self {
        Self {
            source,
            target,
            session: StreamSession::new(),
        }
    }

    pub fn source(&self) -> Provider {
        self.source.provider()
    }

    pub fn target(&self) -> Provider {
        self.target.provider()
    }

    /// Transcode one source chunk into zero or more target chunks.
    ///
    /// A failed chunk leaves the session exactly as it was before the call.
    pub fn push(&mut self, chunk: &Value) -> Result<Vec<Value>> {
        if self.session.is_ended() {
            tracing::debug!(source = %self.source(), "chunk after end of stream ignored");
            return Ok(Vec::new());
        }
        let mut session = self.session.clone();
        let events = self.source.decode_chunk(chunk, &mut session)?;
        let out = self.emit(&events, &mut session)?;
        self.session = session;
        Ok(out)
    }

    /// Re-encode already decoded IR events.
    pub fn push_events(&mut self, events: &[StreamEvent]) -> Result<Vec<Value>> {
        let mut session = self.session.clone();
        let out = self.emit(events, &mut session)?;
        self.session = session;
        Ok(out)
    }

    /// Flush the end of the stream; a no-op if the source already signalled it.
    pub fn finish(&mut self) -> Result<Vec<Value>> {
        if self.session.is_ended() {
            return Ok(Vec::new());
        }
        self.push_events(&[StreamEvent::StreamEnd])
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn into_session(self) -> StreamSession {
        self.session
    }

    fn emit(&self, events: &[StreamEvent], session: &mut StreamSession) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for event in events {
            if session.is_ended() {
                break;
            }
            session.observe(event);
            out.extend(self.target.encode_event(event, session)?);
        }
        Ok(out)
    }
}

/// Map a stream of source chunks into a stream of target chunks.
///
/// The end of the input flushes the transcoder, so targets that need a
/// terminal chunk receive one even when the source has no sentinel.
pub fn transcode_stream<'a, S>(input: S, transcoder: StreamTranscoder) -> BoxStream<'a, Result<Value>>
where
    S: Stream<Item = Result<Value>> + Send + 'a,
{
    input
        .map(Some)
        .chain(stream::once(async { None }))
        .scan(transcoder, |transcoder, item| {
            let produced = match item {
                Some(Ok(chunk)) => transcoder.push(&chunk),
                Some(Err(e)) => Err(e),
                None => transcoder.finish(),
            };
            let items: Vec<Result<Value>> = match produced {
                Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::future::ready(Some(stream::iter(items)))
        })
        .flatten()
        .boxed()
}
