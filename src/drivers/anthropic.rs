//! Claude 适配器：Messages API 与统一 IR 之间的双向转换
//!
//! Anthropic Messages API adapter.
//!
//! Claude keeps the system prompt outside the message list, carries tool
//! results as `tool_result` blocks inside user turns, and streams content as
//! indexed blocks (`content_block_start` / `_delta` / `_stop`).

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{normalize_error, synthesize_id, ProviderAdapter};
use crate::config::TranscodeConfig;
use crate::pipeline::{OpenBlock, PartialToolCall, StreamSession};
use crate::protocol::anthropic::*;
use crate::protocol::Provider;
use crate::types::tool::arguments_from_value;
use crate::types::{
    BuiltinTool, FinishReason, JsonPayload, MediaSource, MessageContent, ReasoningConfig, Role,
    StreamEvent, ToolChoice, UnifiedChoice, UnifiedError, UnifiedMessage, UnifiedMessagePart,
    UnifiedRequest, UnifiedResponse, UnifiedTool, UnifiedToolCall, UnifiedUsage,
};
use crate::utils::data_url;
use crate::validation::{check_range, check_schema, fail, require_messages, require_model};
use crate::{Error, ErrorContext, Result};

const SOURCE: &str = "claude_adapter";

/// Smallest thinking budget the Messages API accepts.
pub const MIN_THINKING_BUDGET: u32 = 1024;

const WEB_SEARCH_TYPE: &str = "web_search_20250305";
const CODE_EXECUTION_TYPE: &str = "code_execution_20250522";

#[derive(Debug, Clone, Default)]
pub struct ClaudeAdapter {
    config: Arc<TranscodeConfig>,
}

impl ClaudeAdapter {
    pub fn new(config: Arc<TranscodeConfig>) -> Self {
        Self { config }
    }

    /// Split one Claude turn into IR messages, preserving block order.
    ///
    /// A user turn holding `tool_result` blocks becomes one tool message per
    /// result, interleaved with user messages for the surrounding content.
    fn turn_to_ir(&self, msg: ClaudeMessage, path: &str, out: &mut Vec<UnifiedMessage>) -> Result<()> {
        let blocks = msg.content.into_blocks();
        match msg.role.as_str() {
            "assistant" => {
                out.push(assistant_blocks_to_ir(blocks, path)?);
            }
            _ => {
                let mut pending: Vec<UnifiedMessagePart> = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            if !pending.is_empty() {
                                out.push(UnifiedMessage::with_parts(
                                    Role::User,
                                    std::mem::take(&mut pending),
                                ));
                            }
                            if is_error == Some(true) {
                                tracing::debug!(tool_use_id = %tool_use_id, "tool result flagged as error");
                            }
                            out.push(UnifiedMessage::tool_result(
                                tool_use_id,
                                tool_result_text(content),
                            ));
                        }
                        other => {
                            if let Some(part) = block_to_part(other) {
                                pending.push(part);
                            }
                        }
                    }
                }
                if !pending.is_empty() {
                    out.push(UnifiedMessage::with_parts(Role::User, pending));
                }
            }
        }
        Ok(())
    }

    fn tool_from_ir(&self, tool: &UnifiedTool) -> ClaudeTool {
        match tool.builtin_kind() {
            Some(kind) => {
                let (prefix, default_type) = match kind {
                    BuiltinTool::WebSearch => ("web_search_", WEB_SEARCH_TYPE),
                    BuiltinTool::CodeExecution => ("code_execution_", CODE_EXECUTION_TYPE),
                };
                let tool_type = tool
                    .tool_type
                    .clone()
                    .filter(|t| t.starts_with(prefix))
                    .unwrap_or_else(|| default_type.to_string());
                ClaudeTool {
                    tool_type: Some(tool_type),
                    name: kind.canonical_name().to_string(),
                    description: None,
                    input_schema: None,
                    max_uses: None,
                }
            }
            None => ClaudeTool {
                tool_type: None,
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: Some(tool.parameters_or_empty()),
                max_uses: None,
            },
        }
    }
}

fn source_to_ir(source: ClaudeSource) -> Option<MediaSource> {
    match source {
        ClaudeSource::Base64 { media_type, data } => Some(MediaSource::Base64 { media_type, data }),
        ClaudeSource::Text { media_type, data } => Some(MediaSource::Base64 {
            media_type,
            data: data_url::encode_text(&data),
        }),
        ClaudeSource::Url { url } => {
            let media_type = data_url::guess_media_type(&url).map(str::to_string);
            Some(MediaSource::Url { url, media_type })
        }
        ClaudeSource::File { file_id } => {
            tracing::warn!(file_id = %file_id, "Claude file references cannot be carried across providers; block dropped");
            None
        }
    }
}

fn source_from_ir(source: &MediaSource, as_document: bool) -> ClaudeSource {
    match source {
        MediaSource::Base64 { media_type, data } => {
            if as_document && media_type.starts_with("text/") {
                if let Some(text) = data_url::decode_text(data) {
                    return ClaudeSource::Text {
                        media_type: media_type.clone(),
                        data: text,
                    };
                }
            }
            ClaudeSource::Base64 {
                media_type: media_type.clone(),
                data: data.clone(),
            }
        }
        MediaSource::Url { url, .. } => ClaudeSource::Url { url: url.clone() },
    }
}

fn block_to_part(block: ContentBlock) -> Option<UnifiedMessagePart> {
    match block {
        ContentBlock::Text { text, .. } => Some(UnifiedMessagePart::text(text)),
        ContentBlock::Image { source } => source_to_ir(source).map(UnifiedMessagePart::image),
        ContentBlock::Document { source, title } => {
            source_to_ir(source).map(|source| UnifiedMessagePart::Document { source, title })
        }
        ContentBlock::Unknown => {
            tracing::warn!("unknown Claude content block dropped");
            None
        }
        other => {
            tracing::debug!(block = ?other, "content block has no place in this turn; dropped");
            None
        }
    }
}

fn tool_result_text(content: Option<ToolResultContent>) -> String {
    match content {
        None => String::new(),
        Some(ToolResultContent::Text(text)) => text,
        Some(ToolResultContent::Blocks(blocks)) => {
            let mut text = String::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text: t, .. } => text.push_str(&t),
                    other => {
                        tracing::warn!(block = ?other, "non-text tool result content dropped");
                    }
                }
            }
            text
        }
    }
}

fn assistant_blocks_to_ir(blocks: Vec<ContentBlock>, path: &str) -> Result<UnifiedMessage> {
    let mut parts = Vec::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();
    for (i, block) in blocks.into_iter().enumerate() {
        match block {
            ContentBlock::Thinking { thinking, .. } => reasoning.push_str(&thinking),
            ContentBlock::RedactedThinking { .. } => {}
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = arguments_from_value(&input).map_err(|e| {
                    Error::malformed_with_context(
                        e.to_string(),
                        ErrorContext::new()
                            .with_field_path(format!("{}.content[{}].input", path, i))
                            .with_source(SOURCE),
                    )
                })?;
                tool_calls.push(UnifiedToolCall::new(id, name, arguments));
            }
            ContentBlock::ServerToolUse { name, .. } => {
                tracing::debug!(tool = %name, "server tool invocation is provider-internal; skipped");
            }
            ContentBlock::WebSearchToolResult { .. } => {}
            other => {
                if let Some(part) = block_to_part(other) {
                    parts.push(part);
                }
            }
        }
    }
    let mut message = UnifiedMessage::with_parts(Role::Assistant, parts).with_tool_calls(tool_calls);
    if !reasoning.is_empty() {
        message.reasoning_content = Some(reasoning);
    }
    Ok(message)
}

fn parts_to_blocks(content: &MessageContent) -> Vec<ContentBlock> {
    match content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                UnifiedMessagePart::Text { text } => ContentBlock::text(text.clone()),
                UnifiedMessagePart::Image { source } => ContentBlock::Image {
                    source: source_from_ir(source, false),
                },
                UnifiedMessagePart::Document { source, title } => ContentBlock::Document {
                    source: source_from_ir(source, true),
                    title: title.clone(),
                },
                UnifiedMessagePart::File { source, filename } => ContentBlock::Document {
                    source: source_from_ir(source, true),
                    title: filename.clone(),
                },
            })
            .collect(),
    }
}

fn assistant_to_blocks(msg: &UnifiedMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    if let Some(thinking) = msg.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
        blocks.push(ContentBlock::Thinking {
            thinking: thinking.clone(),
            signature: None,
        });
    }
    blocks.extend(parts_to_blocks(&msg.content));
    blocks.extend(msg.tool_calls.iter().map(|c| ContentBlock::ToolUse {
        id: c.id.clone(),
        name: c.name.clone(),
        input: Value::Object(c.arguments.clone()),
    }));
    blocks
}

/// Collapse a lone plain text block back to string content.
fn into_content(mut blocks: Vec<ContentBlock>) -> ClaudeContent {
    if blocks.len() == 1 {
        if let ContentBlock::Text {
            citations: None, ..
        } = &blocks[0]
        {
            if let Some(ContentBlock::Text { text, .. }) = blocks.pop() {
                return ClaudeContent::Text(text);
            }
        }
    }
    if blocks.is_empty() {
        return ClaudeContent::Text(String::new());
    }
    ClaudeContent::Blocks(blocks)
}

pub(crate) fn finish_to_ir(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" | "model_context_window_exceeded" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => {
            tracing::debug!(reason = other, "unrecognized Claude stop reason");
            FinishReason::ContentFilter
        }
    }
}

pub(crate) fn finish_from_ir(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::Length => "max_tokens",
        FinishReason::ToolCalls => "tool_use",
        FinishReason::ContentFilter => "refusal",
    }
}

/// Claude reports uncached input separately from cache reads and writes.
fn usage_to_ir(usage: &ClaudeUsage) -> UnifiedUsage {
    let read = usage.cache_read_input_tokens;
    let write = usage.cache_creation_input_tokens;
    UnifiedUsage::new(
        usage
            .input_tokens
            .saturating_add(read.unwrap_or(0))
            .saturating_add(write.unwrap_or(0)),
        usage.output_tokens,
    )
    .with_cache(read, write)
}

fn usage_from_ir(usage: &UnifiedUsage) -> ClaudeUsage {
    ClaudeUsage {
        input_tokens: usage.uncached_prompt_tokens(),
        output_tokens: usage.completion_tokens,
        cache_creation_input_tokens: usage.cache_write_tokens,
        cache_read_input_tokens: usage.cache_read_tokens,
    }
}

fn error_to_ir(err: ClaudeApiError) -> UnifiedError {
    normalize_error(Some(&err.error_type), None, None, err.message, None)
}

fn error_from_ir(err: &UnifiedError) -> ClaudeApiError {
    ClaudeApiError {
        error_type: err.error_type.clone(),
        message: err.message.clone(),
    }
}

impl ProviderAdapter for ClaudeAdapter {
    type Request = MessagesRequest;
    type Response = MessagesResponse;
    type Chunk = ClaudeStreamEvent;

    const PROVIDER: Provider = Provider::Claude;

    fn validate(&self, req: &MessagesRequest) -> Result<()> {
        require_model(Some(req.model.as_str()), SOURCE)?;
        let has_prompt = req.prompt.as_deref().map_or(false, |p| !p.trim().is_empty());
        if !has_prompt {
            require_messages(req.messages.len(), "request.messages", SOURCE)?;
        }
        match req.max_tokens {
            None => return Err(fail("max_tokens is required", "request.max_tokens", SOURCE)),
            Some(0) => {
                return Err(fail(
                    "max_tokens must be greater than zero",
                    "request.max_tokens",
                    SOURCE,
                ))
            }
            Some(_) => {}
        }
        for (i, m) in req.messages.iter().enumerate() {
            if m.role != "user" && m.role != "assistant" {
                return Err(fail(
                    format!("role must be 'user' or 'assistant', got '{}'", m.role),
                    format!("request.messages[{}].role", i),
                    SOURCE,
                ));
            }
        }
        check_range(req.temperature, 0.0, 1.0, "request.temperature", SOURCE)?;
        check_range(req.top_p, 0.0, 1.0, "request.top_p", SOURCE)?;
        if let Some(ThinkingConfig::Enabled { budget_tokens }) = &req.thinking {
            if *budget_tokens < MIN_THINKING_BUDGET {
                return Err(fail(
                    format!("thinking budget must be at least {}", MIN_THINKING_BUDGET),
                    "request.thinking.budget_tokens",
                    SOURCE,
                ));
            }
        }
        for (i, tool) in req.tools.iter().enumerate() {
            let path = format!("request.tools[{}]", i);
            if tool.name.trim().is_empty() {
                return Err(fail("tool name is required", format!("{}.name", path), SOURCE));
            }
            if self.config.strict_schemas {
                if let Some(schema) = &tool.input_schema {
                    check_schema(schema, &format!("{}.input_schema", path), SOURCE)?;
                }
            }
        }
        Ok(())
    }

    fn to_ir(&self, req: MessagesRequest) -> Result<UnifiedRequest> {
        ProviderAdapter::validate(self, &req)?;

        let mut messages = Vec::new();
        match req.system {
            Some(SystemPrompt::Text(text)) if !text.is_empty() => {
                messages.push(UnifiedMessage::system(text));
            }
            Some(SystemPrompt::Blocks(blocks)) => {
                for block in blocks {
                    if let ContentBlock::Text { text, .. } = block {
                        messages.push(UnifiedMessage::system(text));
                    }
                }
            }
            _ => {}
        }
        if req.messages.is_empty() {
            if let Some(prompt) = req.prompt {
                tracing::debug!("legacy prompt field mapped to a single user turn");
                messages.push(UnifiedMessage::user(prompt.trim().to_string()));
            }
        }
        for (i, m) in req.messages.into_iter().enumerate() {
            self.turn_to_ir(m, &format!("request.messages[{}]", i), &mut messages)?;
        }

        let tools = req
            .tools
            .into_iter()
            .map(|t| match BuiltinTool::detect(&t.name, t.tool_type.as_deref()) {
                Some(kind) => {
                    let mut tool = UnifiedTool::builtin(kind);
                    tool.tool_type = t.tool_type;
                    tool
                }
                None => UnifiedTool {
                    name: t.name,
                    description: t.description,
                    parameters: t.input_schema.map(JsonPayload::from),
                    tool_type: Some("function".into()),
                },
            })
            .collect();

        let tool_choice = req.tool_choice.map(|c| match c {
            ClaudeToolChoice::Auto { .. } => ToolChoice::Auto,
            ClaudeToolChoice::Any { .. } => ToolChoice::Required,
            ClaudeToolChoice::Tool { name, .. } => ToolChoice::Tool(name),
            ClaudeToolChoice::None => ToolChoice::None,
        });

        let reasoning = match req.thinking {
            Some(ThinkingConfig::Enabled { budget_tokens }) => Some(ReasoningConfig {
                effort: None,
                budget_tokens: Some(budget_tokens),
            }),
            _ => None,
        };

        Ok(UnifiedRequest {
            model: req.model,
            messages,
            system: None,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            frequency_penalty: None,
            presence_penalty: None,
            seed: None,
            stop: req.stop_sequences,
            stream: req.stream.unwrap_or(false),
            tools,
            tool_choice,
            response_format: None,
            reasoning,
        })
    }

    fn from_ir(&self, ir: &UnifiedRequest) -> Result<MessagesRequest> {
        ir.validate()?;

        let mut turns: Vec<(String, Vec<ContentBlock>)> = Vec::new();
        for m in ir.conversation() {
            let (role, blocks) = match m.role {
                Role::Assistant => ("assistant", assistant_to_blocks(m)),
                Role::Tool => {
                    let id = m.tool_call_id.clone().ok_or_else(|| {
                        Error::unsupported_capability(
                            Provider::Claude,
                            "tool result without a tool_call_id",
                            ErrorContext::new().with_source(SOURCE),
                        )
                    })?;
                    let text = m.text();
                    (
                        "user",
                        vec![ContentBlock::ToolResult {
                            tool_use_id: id,
                            content: Some(ToolResultContent::Text(text)),
                            is_error: None,
                        }],
                    )
                }
                _ => ("user", parts_to_blocks(&m.content)),
            };
            // Claude turns alternate; adjacent same-role turns are merged.
            match turns.last_mut() {
                Some((last_role, last_blocks)) if last_role == role => last_blocks.extend(blocks),
                _ => turns.push((role.to_string(), blocks)),
            }
        }
        let messages = turns
            .into_iter()
            .map(|(role, mut blocks)| {
                // tool_result blocks must lead their user turn.
                blocks.sort_by_key(|b| !matches!(b, ContentBlock::ToolResult { .. }));
                ClaudeMessage {
                    role,
                    content: into_content(blocks),
                }
            })
            .collect();

        let temperature = match ir.temperature {
            Some(t) if t > 1.0 => {
                tracing::warn!(temperature = t, "Claude temperature is capped at 1.0");
                Some(1.0)
            }
            other => other,
        };
        if ir.frequency_penalty.is_some() || ir.presence_penalty.is_some() {
            tracing::warn!("Claude has no frequency/presence penalties; dropped");
        }
        if ir.seed.is_some() {
            tracing::warn!("Claude does not support seed; dropped");
        }
        if matches!(
            ir.response_format,
            Some(crate::types::ResponseFormat::JsonObject)
                | Some(crate::types::ResponseFormat::JsonSchema { .. })
        ) {
            tracing::warn!("Claude has no native response_format; dropped");
        }

        let max_tokens = ir.max_tokens.unwrap_or(self.config.default_max_tokens);
        let thinking = ir
            .reasoning
            .as_ref()
            .and_then(ReasoningConfig::effective_budget)
            .map(|budget| ThinkingConfig::Enabled {
                budget_tokens: budget.max(MIN_THINKING_BUDGET),
            });
        if let Some(ThinkingConfig::Enabled { budget_tokens }) = &thinking {
            if *budget_tokens >= max_tokens {
                tracing::warn!(budget_tokens, max_tokens, "thinking budget is not below max_tokens");
            }
        }

        let tool_choice = ir.tool_choice.as_ref().map(|c| match c {
            ToolChoice::Auto => ClaudeToolChoice::Auto {
                disable_parallel_tool_use: None,
            },
            ToolChoice::Required => ClaudeToolChoice::Any {
                disable_parallel_tool_use: None,
            },
            ToolChoice::Tool(name) => ClaudeToolChoice::Tool {
                name: name.clone(),
                disable_parallel_tool_use: None,
            },
            ToolChoice::None => ClaudeToolChoice::None,
        });

        Ok(MessagesRequest {
            model: ir.model.clone(),
            messages,
            system: ir
                .system_prompt(&self.config.system_separator)
                .map(SystemPrompt::Text),
            max_tokens: Some(max_tokens),
            temperature,
            top_p: ir.top_p,
            top_k: ir.top_k,
            stop_sequences: ir.stop.clone(),
            stream: ir.stream.then_some(true),
            tools: ir.tools.iter().map(|t| self.tool_from_ir(t)).collect(),
            tool_choice,
            thinking,
            metadata: None,
            prompt: None,
        })
    }

    fn response_to_ir(&self, resp: MessagesResponse) -> Result<UnifiedResponse> {
        if let Some(err) = resp.error {
            return Ok(UnifiedResponse::failure(Provider::Claude, error_to_ir(err)));
        }
        if resp.kind == "error" {
            return Ok(UnifiedResponse::failure(
                Provider::Claude,
                normalize_error(None, None, None, "unknown error", None),
            ));
        }
        let message = assistant_blocks_to_ir(resp.content.unwrap_or_default(), "response")?;
        let choice = UnifiedChoice::new(0, message, resp.stop_reason.as_deref().map(finish_to_ir));
        Ok(UnifiedResponse {
            id: resp.id,
            provider: Provider::Claude,
            model: resp.model,
            created: None,
            choices: vec![choice],
            usage: resp.usage.as_ref().map(usage_to_ir),
            error: None,
        })
    }

    fn response_from_ir(&self, ir: &UnifiedResponse) -> Result<MessagesResponse> {
        ir.validate()?;
        if let Some(err) = &ir.error {
            return Ok(MessagesResponse {
                kind: "error".into(),
                error: Some(error_from_ir(err)),
                ..Default::default()
            });
        }
        if ir.choices.len() > 1 {
            tracing::warn!(choices = ir.choices.len(), "Claude responses carry one choice; extra choices dropped");
        }
        let choice = ir.choices.first();
        Ok(MessagesResponse {
            id: if ir.id.is_empty() {
                synthesize_id("msg_")
            } else {
                ir.id.clone()
            },
            kind: "message".into(),
            role: "assistant".into(),
            model: ir.model.clone(),
            content: Some(choice.map(|c| assistant_to_blocks(&c.message)).unwrap_or_default()),
            stop_reason: choice
                .and_then(|c| c.finish_reason)
                .map(|r| finish_from_ir(r).to_string()),
            stop_sequence: None,
            usage: ir.usage.as_ref().map(usage_from_ir),
            error: None,
        })
    }

    fn chunk_to_ir(
        &self,
        event: ClaudeStreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<StreamEvent>> {
        let dec = &mut session.decoder;
        let events = match event {
            ClaudeStreamEvent::MessageStart { message } => {
                dec.started = true;
                dec.usage_base = message.usage.as_ref().map(usage_to_ir);
                vec![StreamEvent::MessageStart {
                    id: Some(message.id).filter(|s| !s.is_empty()),
                    model: Some(message.model).filter(|s| !s.is_empty()),
                }]
            }
            ClaudeStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { text, .. } if !text.is_empty() => {
                    vec![StreamEvent::text(text)]
                }
                ContentBlock::Thinking { thinking, .. } if !thinking.is_empty() => {
                    vec![StreamEvent::ReasoningDelta { text: thinking }]
                }
                ContentBlock::ToolUse { id, name, input } => {
                    let tool = dec.allocate_tool();
                    dec.block_tools.insert(index, tool);
                    let arguments = match &input {
                        Value::Object(map) if !map.is_empty() => input.to_string(),
                        _ => String::new(),
                    };
                    vec![StreamEvent::ToolCallDelta {
                        index: tool,
                        id: Some(id),
                        name: Some(name),
                        arguments,
                    }]
                }
                _ => Vec::new(),
            },
            ClaudeStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![StreamEvent::text(text)],
                BlockDelta::ThinkingDelta { thinking } => {
                    vec![StreamEvent::ReasoningDelta { text: thinking }]
                }
                BlockDelta::InputJsonDelta { partial_json } => match dec.block_tools.get(&index) {
                    Some(tool) => vec![StreamEvent::ToolCallDelta {
                        index: *tool,
                        id: None,
                        name: None,
                        arguments: partial_json,
                    }],
                    None => {
                        tracing::debug!(block = index, "input delta for a non-tool block ignored");
                        Vec::new()
                    }
                },
                BlockDelta::SignatureDelta { .. } | BlockDelta::Unknown => Vec::new(),
            },
            ClaudeStreamEvent::ContentBlockStop { index } => dec
                .block_tools
                .get(&index)
                .map(|tool| vec![StreamEvent::ToolCallEnd { index: *tool }])
                .unwrap_or_default(),
            ClaudeStreamEvent::MessageDelta { delta, usage } => {
                let mut events = Vec::new();
                if let Some(reason) = delta.stop_reason {
                    events.push(StreamEvent::Finish {
                        reason: finish_to_ir(&reason),
                    });
                }
                if let Some(usage) = usage {
                    let base = dec.usage_base.clone().unwrap_or_default();
                    let reported = usage_to_ir(&usage);
                    let merged = if reported.prompt_tokens > 0 {
                        reported
                    } else {
                        UnifiedUsage::new(base.prompt_tokens, usage.output_tokens)
                            .with_cache(base.cache_read_tokens, base.cache_write_tokens)
                    };
                    events.push(StreamEvent::Usage { usage: merged });
                }
                events
            }
            ClaudeStreamEvent::MessageStop => vec![StreamEvent::StreamEnd],
            ClaudeStreamEvent::Ping => Vec::new(),
            ClaudeStreamEvent::Error { error } => vec![StreamEvent::Error {
                error: error_to_ir(error),
            }],
        };
        Ok(events)
    }

    fn chunk_from_ir(
        &self,
        event: &StreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<ClaudeStreamEvent>> {
        let mut out = Vec::new();
        ensure_started(session, &mut out);

        match event {
            StreamEvent::MessageStart { .. } => {}
            StreamEvent::TextDelta { text } => {
                open_block(session, OpenBlock::Text, &mut out, || ContentBlock::text(""));
                out.push(block_delta(session, BlockDelta::TextDelta { text: text.clone() }));
            }
            StreamEvent::ReasoningDelta { text } => {
                open_block(session, OpenBlock::Thinking, &mut out, || ContentBlock::Thinking {
                    thinking: String::new(),
                    signature: None,
                });
                out.push(block_delta(
                    session,
                    BlockDelta::ThinkingDelta {
                        thinking: text.clone(),
                    },
                ));
            }
            StreamEvent::ToolCallDelta { index, .. } => {
                if session.encoder.emitted_tools.contains(index) {
                    tracing::warn!(index, "delta for an already emitted tool call dropped");
                } else {
                    self.flush_tool_calls(session, Some(*index), &mut out);
                }
            }
            StreamEvent::ToolCallEnd { index } => {
                self.flush_tool_calls(session, Some(*index), &mut out);
            }
            StreamEvent::Finish { reason } => {
                self.flush_tool_calls(session, None, &mut out);
                close_block(session, &mut out);
                session.encoder.finish = Some(*reason);
                out.push(ClaudeStreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(finish_from_ir(*reason).to_string()),
                        stop_sequence: None,
                    },
                    usage: session.usage().map(usage_from_ir),
                });
            }
            StreamEvent::Usage { usage } => {
                out.push(ClaudeStreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: session
                            .encoder
                            .finish
                            .map(|r| finish_from_ir(r).to_string()),
                        stop_sequence: None,
                    },
                    usage: Some(usage_from_ir(usage)),
                });
            }
            StreamEvent::Error { error } => out.push(ClaudeStreamEvent::Error {
                error: error_from_ir(error),
            }),
            StreamEvent::StreamEnd => {
                self.flush_tool_calls(session, None, &mut out);
                close_block(session, &mut out);
                if session.encoder.finish.is_none() {
                    let reason = if session.accumulator().is_empty() {
                        FinishReason::Stop
                    } else {
                        FinishReason::ToolCalls
                    };
                    session.encoder.finish = Some(reason);
                    out.push(ClaudeStreamEvent::MessageDelta {
                        delta: MessageDeltaBody {
                            stop_reason: Some(finish_from_ir(reason).to_string()),
                            stop_sequence: None,
                        },
                        usage: session.usage().map(usage_from_ir),
                    });
                }
                if !session.encoder.stopped {
                    session.encoder.stopped = true;
                    out.push(ClaudeStreamEvent::MessageStop);
                }
            }
        }
        Ok(out)
    }
}

impl ClaudeAdapter {
    /// Emit completed tool calls not yet sent, each as one whole `tool_use` block.
    ///
    /// Parallel calls may arrive interleaved while Claude blocks cannot
    /// overlap, so arguments stay in the session accumulator until the call
    /// completes.
    fn flush_tool_calls(
        &self,
        session: &mut StreamSession,
        only: Option<u32>,
        out: &mut Vec<ClaudeStreamEvent>,
    ) {
        let ready: Vec<(u32, PartialToolCall)> = session
            .accumulator()
            .indices()
            .filter(|i| only.map_or(true, |o| o == *i))
            .filter(|i| !session.encoder.emitted_tools.contains(i))
            .filter_map(|i| {
                let call = session.accumulator().get(i).filter(|c| c.complete)?;
                Some((i, call.clone()))
            })
            .collect();
        let prefix = &self.config.tool_call_id_prefix;
        for (index, call) in ready {
            session.encoder.emitted_tools.insert(index);
            open_block(session, OpenBlock::Tool(index), out, || ContentBlock::ToolUse {
                id: call.id.clone().unwrap_or_else(|| synthesize_id(prefix)),
                name: call.name.clone().unwrap_or_default(),
                input: Value::Object(Map::new()),
            });
            if !call.arguments.trim().is_empty() {
                out.push(block_delta(
                    session,
                    BlockDelta::InputJsonDelta {
                        partial_json: call.arguments.clone(),
                    },
                ));
            }
            close_block(session, out);
        }
    }
}

fn ensure_started(session: &mut StreamSession, out: &mut Vec<ClaudeStreamEvent>) {
    if session.encoder.started {
        return;
    }
    let id = session
        .message_id()
        .map(str::to_string)
        .unwrap_or_else(|| synthesize_id("msg_"));
    let model = session.model().unwrap_or_default().to_string();
    let enc = &mut session.encoder;
    enc.started = true;
    enc.id = id.clone();
    enc.model = model.clone();
    out.push(ClaudeStreamEvent::MessageStart {
        message: MessagesResponse {
            id,
            kind: "message".into(),
            role: "assistant".into(),
            model,
            content: Some(Vec::new()),
            stop_reason: None,
            stop_sequence: None,
            usage: Some(ClaudeUsage::default()),
            error: None,
        },
    });
}

/// Make `kind` the open block, closing whatever else is open.
fn open_block(
    session: &mut StreamSession,
    kind: OpenBlock,
    out: &mut Vec<ClaudeStreamEvent>,
    start: impl FnOnce() -> ContentBlock,
) {
    if matches!(session.encoder.open_block, Some((_, open)) if open == kind) {
        return;
    }
    close_block(session, out);
    let enc = &mut session.encoder;
    let index = enc.next_block;
    enc.next_block += 1;
    enc.open_block = Some((index, kind));
    out.push(ClaudeStreamEvent::ContentBlockStart {
        index,
        content_block: start(),
    });
}

fn close_block(session: &mut StreamSession, out: &mut Vec<ClaudeStreamEvent>) {
    if let Some((index, _)) = session.encoder.open_block.take() {
        out.push(ClaudeStreamEvent::ContentBlockStop { index });
    }
}

fn block_delta(session: &StreamSession, delta: BlockDelta) -> ClaudeStreamEvent {
    let index = session
        .encoder
        .open_block
        .map(|(index, _)| index)
        .unwrap_or_default();
    ClaudeStreamEvent::ContentBlockDelta { index, delta }
}
