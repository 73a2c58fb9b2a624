//! OpenAI 适配器：Chat Completions 与统一 IR 之间的双向转换
//!
//! OpenAI Chat Completions adapter.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{normalize_error, synthesize_id, unix_now, ProviderAdapter};
use crate::config::TranscodeConfig;
use crate::pipeline::StreamSession;
use crate::protocol::openai::*;
use crate::protocol::Provider;
use crate::types::tool::parse_arguments;
use crate::types::{
    BuiltinTool, FinishReason, JsonPayload, MediaSource, MessageContent, ReasoningConfig,
    ReasoningEffort, ResponseFormat, Role, StreamEvent, ToolChoice, UnifiedChoice, UnifiedError,
    UnifiedMessage, UnifiedMessagePart, UnifiedRequest, UnifiedResponse, UnifiedTool,
    UnifiedToolCall, UnifiedUsage,
};
use crate::validation::{check_range, check_schema, fail, require_messages, require_model};
use crate::{Error, ErrorContext, Result};

const SOURCE: &str = "openai_adapter";

#[derive(Debug, Clone, Default)]
pub struct OpenAiAdapter {
    config: Arc<TranscodeConfig>,
}

impl OpenAiAdapter {
    pub fn new(config: Arc<TranscodeConfig>) -> Self {
        Self { config }
    }

    fn message_to_ir(&self, msg: ChatMessage, path: &str) -> Result<UnifiedMessage> {
        let role = match msg.role.as_str() {
            "system" | "developer" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" | "function" => Role::Tool,
            other => {
                return Err(fail(format!("unknown role '{}'", other), path, SOURCE));
            }
        };

        let mut content = match msg.content {
            None => MessageContent::default(),
            Some(ChatContent::Text(text)) => MessageContent::Text(text),
            Some(ChatContent::Parts(parts)) => {
                MessageContent::from_parts(parts.into_iter().filter_map(part_to_ir).collect())
            }
        };
        if content.is_empty() {
            if let Some(refusal) = msg.refusal {
                content = MessageContent::Text(refusal);
            }
        }

        let mut tool_calls = Vec::with_capacity(msg.tool_calls.len());
        for (i, call) in msg.tool_calls.into_iter().enumerate() {
            let arguments = parse_arguments(&call.function.arguments).map_err(|e| {
                Error::malformed_with_context(
                    e.to_string(),
                    ErrorContext::new()
                        .with_field_path(format!("{}.tool_calls[{}].function.arguments", path, i))
                        .with_source(SOURCE),
                )
            })?;
            let id = if call.id.is_empty() {
                synthesize_id(&self.config.tool_call_id_prefix)
            } else {
                call.id
            };
            tool_calls.push(UnifiedToolCall::new(id, call.function.name, arguments));
        }

        Ok(UnifiedMessage {
            role,
            content,
            name: msg.name,
            tool_calls,
            tool_call_id: if role == Role::Tool { msg.tool_call_id } else { None },
            reasoning_content: msg.reasoning_content.filter(|r| !r.is_empty()),
        })
    }

    fn message_from_ir(&self, msg: &UnifiedMessage, include_reasoning: bool) -> Result<ChatMessage> {
        let mut out = ChatMessage {
            role: msg.role.as_str().to_string(),
            name: msg.name.clone(),
            ..Default::default()
        };
        match msg.role {
            Role::System => {
                out.content = Some(ChatContent::Text(msg.text()));
            }
            Role::User => {
                out.content = Some(content_from_ir(&msg.content));
            }
            Role::Assistant => {
                out.tool_calls = msg
                    .tool_calls
                    .iter()
                    .map(|c| ChatToolCall {
                        id: c.id.clone(),
                        call_type: "function".into(),
                        function: FunctionCall {
                            name: c.name.clone(),
                            arguments: c.encoded_arguments(),
                        },
                    })
                    .collect();
                if !(msg.content.is_empty() && !out.tool_calls.is_empty()) {
                    out.content = Some(content_from_ir(&msg.content));
                }
                if include_reasoning {
                    out.reasoning_content = msg.reasoning_content.clone();
                } else if msg.reasoning_content.is_some() {
                    tracing::debug!("reasoning content is not sent back in OpenAI requests");
                }
            }
            Role::Tool => {
                let id = msg.tool_call_id.clone().ok_or_else(|| {
                    Error::unsupported_capability(
                        Provider::OpenAi,
                        "tool result without a tool_call_id",
                        ErrorContext::new().with_source(SOURCE),
                    )
                })?;
                out.tool_call_id = Some(id);
                out.content = Some(ChatContent::Text(msg.text()));
                out.name = None;
            }
        }
        Ok(out)
    }
}

fn part_to_ir(part: ChatContentPart) -> Option<UnifiedMessagePart> {
    match part {
        ChatContentPart::Text { text } => Some(UnifiedMessagePart::text(text)),
        ChatContentPart::ImageUrl { image_url } => Some(UnifiedMessagePart::image(
            MediaSource::from_url_or_data(&image_url.url),
        )),
        ChatContentPart::File { file } => match file.file_data {
            Some(data) => Some(UnifiedMessagePart::File {
                source: MediaSource::from_url_or_data(&data),
                filename: file.filename,
            }),
            None => {
                tracing::warn!(file_id = ?file.file_id, "uploaded file references cannot be carried across providers; part dropped");
                None
            }
        },
        ChatContentPart::Other => {
            tracing::warn!("unsupported OpenAI content part dropped");
            None
        }
    }
}

fn content_from_ir(content: &MessageContent) -> ChatContent {
    match content {
        MessageContent::Text(text) => ChatContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            ChatContent::Parts(parts.iter().filter_map(part_from_ir).collect())
        }
    }
}

fn part_from_ir(part: &UnifiedMessagePart) -> Option<ChatContentPart> {
    match part {
        UnifiedMessagePart::Text { text } => Some(ChatContentPart::Text { text: text.clone() }),
        UnifiedMessagePart::Image { source } => Some(ChatContentPart::ImageUrl {
            image_url: ImageUrl {
                url: source.to_url(),
                detail: None,
            },
        }),
        UnifiedMessagePart::File { source, filename } => file_part(source, filename.clone()),
        UnifiedMessagePart::Document { source, title } => file_part(source, title.clone()),
    }
}

fn file_part(source: &MediaSource, filename: Option<String>) -> Option<ChatContentPart> {
    match source {
        MediaSource::Base64 { .. } => Some(ChatContentPart::File {
            file: FileRef {
                file_data: Some(source.to_url()),
                file_id: None,
                filename,
            },
        }),
        MediaSource::Url { url, .. } => {
            tracing::warn!(url = %url, "OpenAI file parts need inline data; URL document dropped");
            None
        }
    }
}

pub(crate) fn finish_to_ir(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        other => {
            tracing::debug!(reason = other, "unrecognized OpenAI finish reason");
            FinishReason::ContentFilter
        }
    }
}

pub(crate) fn finish_from_ir(reason: FinishReason) -> &'static str {
    reason.as_str()
}

fn usage_to_ir(usage: &ChatUsage) -> UnifiedUsage {
    UnifiedUsage::new(usage.prompt_tokens, usage.completion_tokens)
        .with_cache(
            usage
                .prompt_tokens_details
                .as_ref()
                .and_then(|d| d.cached_tokens),
            None,
        )
        .with_reasoning(
            usage
                .completion_tokens_details
                .as_ref()
                .and_then(|d| d.reasoning_tokens),
        )
        .reconcile_total(Some(usage.total_tokens))
}

fn usage_from_ir(usage: &UnifiedUsage) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        prompt_tokens_details: usage.cache_read_tokens.map(|cached| PromptTokensDetails {
            cached_tokens: Some(cached),
        }),
        completion_tokens_details: usage.reasoning_tokens.map(|r| CompletionTokensDetails {
            reasoning_tokens: Some(r),
        }),
    }
}

fn error_to_ir(err: ApiError) -> UnifiedError {
    let code = err.code.map(|c| match c {
        Value::String(s) => s,
        other => other.to_string(),
    });
    normalize_error(err.error_type.as_deref(), code, None, err.message, err.param)
}

fn error_from_ir(err: &UnifiedError) -> ApiError {
    ApiError {
        message: err.message.clone(),
        error_type: Some(err.error_type.clone()),
        param: err.param.clone(),
        code: err.code.clone().map(Value::String),
    }
}

fn tool_to_ir(tool: ChatTool) -> Option<UnifiedTool> {
    match tool.function {
        Some(f) if tool.tool_type == "function" => Some(UnifiedTool {
            name: f.name,
            description: f.description,
            parameters: f.parameters.map(JsonPayload::from),
            tool_type: Some(tool.tool_type),
        }),
        _ => match BuiltinTool::from_type(&tool.tool_type) {
            Some(kind) => {
                let mut t = UnifiedTool::builtin(kind);
                t.tool_type = Some(tool.tool_type);
                Some(t)
            }
            None => {
                tracing::warn!(tool_type = %tool.tool_type, "unsupported OpenAI tool type dropped");
                None
            }
        },
    }
}

impl ProviderAdapter for OpenAiAdapter {
    type Request = ChatCompletionRequest;
    type Response = ChatCompletion;
    type Chunk = ChatStreamItem;

    const PROVIDER: Provider = Provider::OpenAi;

    fn validate(&self, req: &ChatCompletionRequest) -> Result<()> {
        require_model(Some(req.model.as_str()), SOURCE)?;
        require_messages(req.messages.len(), "request.messages", SOURCE)?;
        for (i, m) in req.messages.iter().enumerate() {
            let path = format!("request.messages[{}]", i);
            match m.role.as_str() {
                "system" | "developer" | "user" | "assistant" | "function" => {}
                "tool" => {
                    if m.tool_call_id.as_deref().map_or(true, str::is_empty) {
                        return Err(fail(
                            "tool messages require tool_call_id",
                            format!("{}.tool_call_id", path),
                            SOURCE,
                        ));
                    }
                }
                "" => return Err(fail("role is required", format!("{}.role", path), SOURCE)),
                other => {
                    return Err(fail(
                        format!("unknown role '{}'", other),
                        format!("{}.role", path),
                        SOURCE,
                    ))
                }
            }
            for (j, call) in m.tool_calls.iter().enumerate() {
                if call.function.name.trim().is_empty() {
                    return Err(fail(
                        "tool call name is required",
                        format!("{}.tool_calls[{}].function.name", path, j),
                        SOURCE,
                    ));
                }
            }
        }
        check_range(req.temperature, 0.0, 2.0, "request.temperature", SOURCE)?;
        check_range(req.top_p, 0.0, 1.0, "request.top_p", SOURCE)?;
        check_range(req.frequency_penalty, -2.0, 2.0, "request.frequency_penalty", SOURCE)?;
        check_range(req.presence_penalty, -2.0, 2.0, "request.presence_penalty", SOURCE)?;
        for (i, tool) in req.tools.iter().enumerate() {
            if tool.tool_type != "function" {
                continue;
            }
            let path = format!("request.tools[{}].function", i);
            let f = tool
                .function
                .as_ref()
                .ok_or_else(|| fail("function tools need a function definition", &path, SOURCE))?;
            if f.name.trim().is_empty() {
                return Err(fail("function name is required", format!("{}.name", path), SOURCE));
            }
            if self.config.strict_schemas {
                if let Some(schema) = &f.parameters {
                    check_schema(schema, &format!("{}.parameters", path), SOURCE)?;
                }
            }
        }
        if self.config.strict_schemas {
            if let Some(ChatResponseFormat::JsonSchema { json_schema }) = &req.response_format {
                if let Some(schema) = &json_schema.schema {
                    check_schema(schema, "request.response_format.json_schema.schema", SOURCE)?;
                }
            }
        }
        Ok(())
    }

    fn to_ir(&self, req: ChatCompletionRequest) -> Result<UnifiedRequest> {
        ProviderAdapter::validate(self, &req)?;

        let messages = req
            .messages
            .into_iter()
            .enumerate()
            .map(|(i, m)| self.message_to_ir(m, &format!("request.messages[{}]", i)))
            .collect::<Result<Vec<_>>>()?;

        let mut tools: Vec<UnifiedTool> = req.tools.into_iter().filter_map(tool_to_ir).collect();
        if req.web_search_options.is_some()
            && !tools
                .iter()
                .any(|t| t.builtin_kind() == Some(BuiltinTool::WebSearch))
        {
            tools.push(UnifiedTool::builtin(BuiltinTool::WebSearch));
        }

        let tool_choice = match req.tool_choice {
            None => None,
            Some(ChatToolChoice::Named(named)) => Some(ToolChoice::Tool(named.function.name)),
            Some(ChatToolChoice::Mode(mode)) => match mode.as_str() {
                "auto" => Some(ToolChoice::Auto),
                "none" => Some(ToolChoice::None),
                "required" => Some(ToolChoice::Required),
                other => {
                    tracing::warn!(mode = other, "unknown tool_choice mode ignored");
                    None
                }
            },
        };

        let response_format = req.response_format.map(|f| match f {
            ChatResponseFormat::Text => ResponseFormat::Text,
            ChatResponseFormat::JsonObject => ResponseFormat::JsonObject,
            ChatResponseFormat::JsonSchema { json_schema } => ResponseFormat::JsonSchema {
                name: Some(json_schema.name).filter(|n| !n.is_empty()),
                schema: json_schema
                    .schema
                    .map(JsonPayload::from)
                    .unwrap_or_else(JsonPayload::empty_object_schema),
                strict: json_schema.strict,
            },
        });

        let reasoning = req
            .reasoning_effort
            .as_deref()
            .and_then(ReasoningEffort::parse)
            .map(|effort| ReasoningConfig {
                effort: Some(effort),
                budget_tokens: None,
            });

        if req.n.map_or(false, |n| n > 1) {
            tracing::warn!("n > 1 is not carried across providers");
        }

        Ok(UnifiedRequest {
            model: req.model,
            messages,
            system: None,
            max_tokens: req.max_completion_tokens.or(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: None,
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            seed: req.seed,
            stop: req.stop.map(StopSequences::into_vec).unwrap_or_default(),
            stream: req.stream.unwrap_or(false),
            tools,
            tool_choice,
            response_format,
            reasoning,
        })
    }

    fn from_ir(&self, ir: &UnifiedRequest) -> Result<ChatCompletionRequest> {
        ir.validate()?;

        let mut messages = Vec::with_capacity(ir.messages.len() + 1);
        if let Some(system) = ir.system.as_ref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".into(),
                content: Some(ChatContent::Text(system.clone())),
                ..Default::default()
            });
        }
        for m in &ir.messages {
            messages.push(self.message_from_ir(m, false)?);
        }

        let mut tools = Vec::new();
        let mut web_search_options = None;
        for t in &ir.tools {
            match t.builtin_kind() {
                Some(BuiltinTool::WebSearch) => web_search_options = Some(json!({})),
                Some(BuiltinTool::CodeExecution) => {
                    tracing::warn!(tool = %t.name, "OpenAI chat completions has no code execution tool; dropped");
                }
                None => tools.push(ChatTool {
                    tool_type: "function".into(),
                    function: Some(FunctionDefinition {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: Some(t.parameters_or_empty()),
                        strict: None,
                    }),
                }),
            }
        }

        let tool_choice = ir.tool_choice.as_ref().map(|c| match c {
            ToolChoice::Auto => ChatToolChoice::Mode("auto".into()),
            ToolChoice::None => ChatToolChoice::Mode("none".into()),
            ToolChoice::Required => ChatToolChoice::Mode("required".into()),
            ToolChoice::Tool(name) => ChatToolChoice::Named(NamedToolChoice {
                choice_type: "function".into(),
                function: NamedFunction { name: name.clone() },
            }),
        });

        let response_format = ir.response_format.as_ref().map(|f| match f {
            ResponseFormat::Text => ChatResponseFormat::Text,
            ResponseFormat::JsonObject => ChatResponseFormat::JsonObject,
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => ChatResponseFormat::JsonSchema {
                json_schema: JsonSchemaSpec {
                    name: name.clone().unwrap_or_else(|| "response".into()),
                    description: None,
                    schema: Some(schema.to_value()),
                    strict: *strict,
                },
            },
        });

        if ir.top_k.is_some() {
            tracing::warn!("top_k is not supported by OpenAI; dropped");
        }

        Ok(ChatCompletionRequest {
            model: ir.model.clone(),
            messages,
            max_tokens: ir.max_tokens,
            max_completion_tokens: None,
            temperature: ir.temperature,
            top_p: ir.top_p,
            frequency_penalty: ir.frequency_penalty,
            presence_penalty: ir.presence_penalty,
            seed: ir.seed,
            stop: if ir.stop.is_empty() {
                None
            } else {
                Some(StopSequences::Many(ir.stop.clone()))
            },
            stream: ir.stream.then_some(true),
            stream_options: ir.stream.then(|| json!({"include_usage": true})),
            tools,
            tool_choice,
            response_format,
            reasoning_effort: ir
                .reasoning
                .as_ref()
                .and_then(ReasoningConfig::effective_effort)
                .map(|e| e.as_str().to_string()),
            web_search_options,
            n: None,
            user: None,
        })
    }

    fn response_to_ir(&self, resp: ChatCompletion) -> Result<UnifiedResponse> {
        if let Some(err) = resp.error {
            return Ok(UnifiedResponse::failure(Provider::OpenAi, error_to_ir(err)));
        }
        let mut choices = Vec::with_capacity(resp.choices.len());
        for (i, c) in resp.choices.into_iter().enumerate() {
            let mut message =
                self.message_to_ir(c.message, &format!("response.choices[{}].message", i))?;
            message.role = Role::Assistant;
            choices.push(UnifiedChoice {
                index: c.index,
                message,
                finish_reason: c.finish_reason.as_deref().map(finish_to_ir),
                logprobs: c.logprobs,
            });
        }
        Ok(UnifiedResponse {
            id: resp.id,
            provider: Provider::OpenAi,
            model: resp.model,
            created: resp.created,
            choices,
            usage: resp.usage.as_ref().map(usage_to_ir),
            error: None,
        })
    }

    fn response_from_ir(&self, ir: &UnifiedResponse) -> Result<ChatCompletion> {
        ir.validate()?;
        if let Some(err) = &ir.error {
            return Ok(ChatCompletion {
                error: Some(error_from_ir(err)),
                ..Default::default()
            });
        }
        let choices = ir
            .choices
            .iter()
            .map(|c| {
                Ok(ChatChoice {
                    index: c.index,
                    message: self.message_from_ir(&c.message, true)?,
                    finish_reason: c.finish_reason.map(|r| finish_from_ir(r).to_string()),
                    logprobs: c.logprobs.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ChatCompletion {
            id: if ir.id.is_empty() {
                synthesize_id("chatcmpl-")
            } else {
                ir.id.clone()
            },
            object: "chat.completion".into(),
            created: Some(ir.created.unwrap_or_else(unix_now)),
            model: ir.model.clone(),
            choices,
            usage: ir.usage.as_ref().map(usage_from_ir),
            system_fingerprint: None,
            error: None,
        })
    }

    fn chunk_to_ir(
        &self,
        item: ChatStreamItem,
        session: &mut StreamSession,
    ) -> Result<Vec<StreamEvent>> {
        let chunk = match item {
            ChatStreamItem::Sentinel(s) if s.trim() == DONE_SENTINEL => {
                return Ok(vec![StreamEvent::StreamEnd]);
            }
            ChatStreamItem::Sentinel(s) => {
                return Err(Error::malformed_with_context(
                    "unexpected string in OpenAI stream",
                    ErrorContext::new().with_details(s).with_source(SOURCE),
                ));
            }
            ChatStreamItem::Chunk(chunk) => chunk,
        };

        let mut events = Vec::new();
        if !session.decoder.started {
            session.decoder.started = true;
            events.push(StreamEvent::MessageStart {
                id: Some(chunk.id).filter(|s| !s.is_empty()),
                model: Some(chunk.model).filter(|s| !s.is_empty()),
            });
        }
        if let Some(err) = chunk.error {
            events.push(StreamEvent::Error {
                error: error_to_ir(err),
            });
        }
        for choice in chunk.choices {
            if choice.index != 0 {
                tracing::debug!(index = choice.index, "only the first streamed choice is transcoded");
                continue;
            }
            let delta = choice.delta;
            if let Some(text) = delta.reasoning_content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::ReasoningDelta { text });
            }
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::text(text));
            }
            if let Some(text) = delta.refusal.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::text(text));
            }
            for tc in delta.tool_calls {
                session.decoder.saw_tool_call = true;
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                events.push(StreamEvent::ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                });
            }
            if let Some(reason) = choice.finish_reason {
                events.push(StreamEvent::Finish {
                    reason: finish_to_ir(&reason),
                });
            }
        }
        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage {
                usage: usage_to_ir(&usage),
            });
        }
        Ok(events)
    }

    fn chunk_from_ir(
        &self,
        event: &StreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<ChatStreamItem>> {
        if !session.encoder.started {
            let id = session
                .message_id()
                .map(str::to_string)
                .unwrap_or_else(|| synthesize_id("chatcmpl-"));
            let model = session.model().unwrap_or_default().to_string();
            let enc = &mut session.encoder;
            enc.started = true;
            enc.id = id;
            enc.model = model;
            enc.created = unix_now();
        }
        let enc = &session.encoder;
        let chunk = |delta: ChunkDelta, finish_reason: Option<String>| ChatCompletionChunk {
            id: enc.id.clone(),
            object: "chat.completion.chunk".into(),
            created: enc.created,
            model: enc.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
                logprobs: None,
            }],
            usage: None,
            error: None,
        };

        let out = match event {
            StreamEvent::MessageStart { .. } => vec![chunk(
                ChunkDelta {
                    role: Some("assistant".into()),
                    content: Some(String::new()),
                    ..Default::default()
                },
                None,
            )],
            StreamEvent::TextDelta { text } => vec![chunk(
                ChunkDelta {
                    content: Some(text.clone()),
                    ..Default::default()
                },
                None,
            )],
            StreamEvent::ReasoningDelta { text } => vec![chunk(
                ChunkDelta {
                    reasoning_content: Some(text.clone()),
                    ..Default::default()
                },
                None,
            )],
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => vec![chunk(
                ChunkDelta {
                    tool_calls: vec![ToolCallChunk {
                        index: *index,
                        id: id.clone(),
                        call_type: id.as_ref().map(|_| "function".to_string()),
                        function: Some(FunctionCallDelta {
                            name: name.clone(),
                            arguments: Some(arguments.clone()),
                        }),
                    }],
                    ..Default::default()
                },
                None,
            )],
            StreamEvent::ToolCallEnd { .. } => Vec::new(),
            StreamEvent::Finish { reason } => vec![chunk(
                ChunkDelta::default(),
                Some(finish_from_ir(*reason).to_string()),
            )],
            StreamEvent::Usage { usage } => {
                let mut c = chunk(ChunkDelta::default(), None);
                c.choices.clear();
                c.usage = Some(usage_from_ir(usage));
                vec![c]
            }
            StreamEvent::Error { error } => {
                let mut c = chunk(ChunkDelta::default(), None);
                c.choices.clear();
                c.error = Some(error_from_ir(error));
                vec![c]
            }
            StreamEvent::StreamEnd => {
                return Ok(vec![ChatStreamItem::Sentinel(DONE_SENTINEL.to_string())]);
            }
        };
        Ok(out.into_iter().map(ChatStreamItem::Chunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::default()
    }

    fn request(v: Value) -> ChatCompletionRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_to_ir_maps_roles_and_tool_calls() {
        let ir = adapter()
            .to_ir(request(json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "developer", "content": "Be brief."},
                    {"role": "user", "content": "Weather in NYC?"},
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "get_weather", "arguments": "{\"location\":\"NYC\"}"}}
                    ]},
                    {"role": "tool", "tool_call_id": "call_1", "content": "72F"}
                ],
                "max_completion_tokens": 256,
                "stop": "END"
            })))
            .unwrap();
        assert_eq!(ir.messages[0].role, Role::System);
        assert_eq!(ir.messages[2].tool_calls[0].arguments["location"], "NYC");
        assert_eq!(ir.messages[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(ir.max_tokens, Some(256));
        assert_eq!(ir.stop, vec!["END"]);
    }

    #[test]
    fn test_to_ir_rejects_bad_arguments() {
        let err = adapter()
            .to_ir(request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "assistant", "tool_calls": [
                    {"id": "c", "type": "function", "function": {"name": "f", "arguments": "[1]"}}
                ]}]
            })))
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");
    }

    #[test]
    fn test_validate_requires_tool_call_id() {
        let err = adapter()
            .validate(&request(json!({
                "model": "gpt-4o",
                "messages": [{"role": "tool", "content": "x"}]
            })))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_builtin_search_becomes_web_search_options() {
        let mut ir = UnifiedRequest::new("gpt-4o", vec![UnifiedMessage::user("news?")]);
        ir.tools = vec![UnifiedTool {
            name: "google_search".into(),
            description: None,
            parameters: None,
            tool_type: None,
        }];
        let req = adapter().from_ir(&ir).unwrap();
        assert!(req.tools.is_empty());
        assert_eq!(req.web_search_options, Some(json!({})));
    }

    #[test]
    fn test_multimodal_parts_round_trip() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "Describe "},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                {"type": "text", "text": "please"}
            ]}]
        }));
        let ir = adapter().to_ir(req).unwrap();
        assert_eq!(ir.messages[0].text(), "Describe please");
        let back = adapter().from_ir(&ir).unwrap();
        match &back.messages[0].content {
            Some(ChatContent::Parts(parts)) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[1], ChatContentPart::ImageUrl { image_url } if image_url.url == "data:image/png;base64,AAAA"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_response_usage_and_finish() {
        let resp: ChatCompletion = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "weird"}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 40, "total_tokens": 140,
                      "prompt_tokens_details": {"cached_tokens": 60},
                      "completion_tokens_details": {"reasoning_tokens": 30}}
        }))
        .unwrap();
        let ir = adapter().response_to_ir(resp).unwrap();
        assert_eq!(ir.choices[0].finish_reason, Some(FinishReason::ContentFilter));
        let usage = ir.usage.unwrap();
        assert_eq!(usage.total_tokens, 140);
        assert_eq!(usage.cache_read_tokens, Some(60));
        assert_eq!(usage.reasoning_tokens, Some(30));
        assert!(usage.is_consistent());
        assert_eq!(ir.created, Some(1700000000));
    }

    #[test]
    fn test_error_body() {
        let resp: ChatCompletion = serde_json::from_value(json!({
            "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
        }))
        .unwrap();
        let ir = adapter().response_to_ir(resp).unwrap();
        assert!(ir.choices.is_empty());
        assert_eq!(ir.error.as_ref().unwrap().error_type, "rate_limit_error");
        let back = adapter().response_from_ir(&ir).unwrap();
        assert_eq!(back.error.unwrap().code, Some(json!("rate_limit_exceeded")));
        assert!(back.choices.is_empty());
    }

    #[test]
    fn test_stream_decode_done_and_tool_delta() {
        let a = adapter();
        let mut session = StreamSession::new();
        let chunk: ChatStreamItem = serde_json::from_value(json!({
            "id": "c1", "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "type": "function",
                 "function": {"name": "get_weather", "arguments": "{\"lo"}}
            ]}}]
        }))
        .unwrap();
        let events = a.chunk_to_ir(chunk, &mut session).unwrap();
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta { index: 0, name: Some(n), .. } if n == "get_weather"));

        let done = a
            .chunk_to_ir(ChatStreamItem::Sentinel("[DONE]".into()), &mut session)
            .unwrap();
        assert_eq!(done, vec![StreamEvent::StreamEnd]);
    }

    #[test]
    fn test_stream_encode_end_is_sentinel() {
        let a = adapter();
        let mut session = StreamSession::new();
        session.observe(&StreamEvent::StreamEnd);
        let out = a.chunk_from_ir(&StreamEvent::StreamEnd, &mut session).unwrap();
        assert_eq!(out, vec![ChatStreamItem::Sentinel("[DONE]".into())]);
    }
}
