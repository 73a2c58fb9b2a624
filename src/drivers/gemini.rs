//! Gemini 适配器：generateContent 与统一 IR 之间的双向转换
//!
//! Google Gemini `generateContent` adapter.
//!
//! Gemini has no tool-call ids on the wire in most API versions, so function
//! responses are linked back to their calls by name, oldest pending call
//! first. Streamed function calls always arrive whole, one part per call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::{fenced, normalize_error, synthesize_id, ProviderAdapter};
use crate::config::TranscodeConfig;
use crate::pipeline::StreamSession;
use crate::protocol::gemini::*;
use crate::protocol::Provider;
use crate::types::tool::arguments_from_value;
use crate::types::{
    BuiltinTool, FinishReason, JsonPayload, MediaSource, MessageContent, ReasoningConfig,
    ReasoningEffort, ResponseFormat, Role, StreamEvent, ToolChoice, UnifiedChoice, UnifiedError,
    UnifiedMessage, UnifiedMessagePart, UnifiedRequest, UnifiedResponse, UnifiedTool,
    UnifiedToolCall, UnifiedUsage,
};
use crate::utils::data_url;
use crate::validation::{check_range, check_schema, fail, require_messages, require_model};
use crate::{Error, ErrorContext, Result};

const SOURCE: &str = "gemini_adapter";

const JSON_MIME: &str = "application/json";

const SAFETY_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

#[derive(Debug, Clone, Default)]
pub struct GeminiAdapter {
    config: Arc<TranscodeConfig>,
}

/// Function calls awaiting their response, in call order.
#[derive(Debug, Default)]
struct PendingCalls {
    calls: Vec<(String, String)>,
}

impl PendingCalls {
    fn push(&mut self, id: &str, name: &str) {
        self.calls.push((id.to_string(), name.to_string()));
    }

    /// Resolve a response to a call id: exact id first, then the oldest
    /// pending call with the same name.
    fn resolve(&mut self, id: Option<&str>, name: &str) -> Option<String> {
        let pos = id
            .and_then(|id| self.calls.iter().position(|(cid, _)| cid == id))
            .or_else(|| self.calls.iter().position(|(_, n)| n == name))?;
        Some(self.calls.remove(pos).0)
    }
}

impl GeminiAdapter {
    pub fn new(config: Arc<TranscodeConfig>) -> Self {
        Self { config }
    }

    fn new_call_id(&self) -> String {
        synthesize_id(&self.config.tool_call_id_prefix)
    }

    fn model_content_to_ir(
        &self,
        content: Content,
        path: &str,
        pending: &mut PendingCalls,
    ) -> Result<UnifiedMessage> {
        let mut parts = Vec::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();
        for (i, part) in content.parts.into_iter().enumerate() {
            if part.is_thought() {
                if let Some(text) = part.text {
                    reasoning.push_str(&text);
                }
                continue;
            }
            if let Some(call) = part.function_call {
                let arguments = arguments_from_value(call.args.as_ref().unwrap_or(&Value::Null))
                    .map_err(|e| {
                        Error::malformed_with_context(
                            e.to_string(),
                            ErrorContext::new()
                                .with_field_path(format!("{}.parts[{}].functionCall.args", path, i))
                                .with_source(SOURCE),
                        )
                    })?;
                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| self.new_call_id());
                pending.push(&id, &call.name);
                tool_calls.push(UnifiedToolCall::new(id, call.name, arguments));
                continue;
            }
            if let Some(part) = media_or_text_part(part) {
                parts.push(part);
            }
        }
        let mut message =
            UnifiedMessage::with_parts(Role::Assistant, parts).with_tool_calls(tool_calls);
        if !reasoning.is_empty() {
            message.reasoning_content = Some(reasoning);
        }
        Ok(message)
    }

    fn user_content_to_ir(
        &self,
        content: Content,
        pending: &mut PendingCalls,
        out: &mut Vec<UnifiedMessage>,
    ) {
        let mut buffered: Vec<UnifiedMessagePart> = Vec::new();
        for part in content.parts {
            if let Some(response) = part.function_response {
                if !buffered.is_empty() {
                    out.push(UnifiedMessage::with_parts(
                        Role::User,
                        std::mem::take(&mut buffered),
                    ));
                }
                let id = pending
                    .resolve(response.id.as_deref(), &response.name)
                    .unwrap_or_else(|| {
                        tracing::warn!(name = %response.name, "function response without a matching call");
                        response.id.clone().unwrap_or_else(|| self.new_call_id())
                    });
                out.push(
                    UnifiedMessage::tool_result(id, unwrap_response(&response.response))
                        .with_name(response.name),
                );
                continue;
            }
            if let Some(part) = media_or_text_part(part) {
                buffered.push(part);
            }
        }
        if !buffered.is_empty() {
            out.push(UnifiedMessage::with_parts(Role::User, buffered));
        }
    }

    fn safety_settings(&self) -> Vec<SafetySetting> {
        if !self.config.gemini_relaxed_safety {
            return Vec::new();
        }
        SAFETY_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: category.to_string(),
                threshold: "BLOCK_NONE".into(),
            })
            .collect()
    }
}

fn media_or_text_part(part: Part) -> Option<UnifiedMessagePart> {
    if let Some(text) = part.text {
        return Some(UnifiedMessagePart::text(text));
    }
    if let Some(blob) = part.inline_data {
        return Some(UnifiedMessagePart::from_media(MediaSource::Base64 {
            media_type: blob.mime_type,
            data: blob.data,
        }));
    }
    if let Some(file) = part.file_data {
        let media_type = file
            .mime_type
            .or_else(|| data_url::guess_media_type(&file.file_uri).map(str::to_string));
        return Some(UnifiedMessagePart::from_media(MediaSource::Url {
            url: file.file_uri,
            media_type,
        }));
    }
    if let Some(code) = part.executable_code {
        return Some(UnifiedMessagePart::text(fenced(&code.language, &code.code)));
    }
    if let Some(result) = part.code_execution_result {
        return Some(UnifiedMessagePart::text(fenced(
            "output",
            result.output.as_deref().unwrap_or_default(),
        )));
    }
    tracing::debug!("empty Gemini part dropped");
    None
}

/// Flatten a function response object into tool-result text.
fn unwrap_response(response: &Value) -> String {
    if let Value::Object(map) = response {
        if map.len() == 1 {
            match (map.get("content"), map.get("result")) {
                (Some(Value::String(s)), _) | (_, Some(Value::String(s))) => return s.clone(),
                (_, Some(arr @ Value::Array(_))) => return arr.to_string(),
                _ => {}
            }
        }
    }
    match response {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wrap tool-result text as a function response object.
fn wrap_response(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(obj @ Value::Object(_)) => obj,
        Ok(arr @ Value::Array(_)) => json!({ "result": arr }),
        _ => json!({ "content": text }),
    }
}

fn part_from_ir(part: &UnifiedMessagePart) -> Part {
    let source = match part {
        UnifiedMessagePart::Text { text } => return Part::text(text.clone()),
        other => match other.source() {
            Some(source) => source,
            None => return Part::default(),
        },
    };
    match source {
        MediaSource::Base64 { media_type, data } => Part {
            inline_data: Some(Blob {
                mime_type: media_type.clone(),
                data: data.clone(),
            }),
            ..Default::default()
        },
        MediaSource::Url { url, media_type } => Part {
            file_data: Some(FileData {
                mime_type: media_type
                    .clone()
                    .or_else(|| data_url::guess_media_type(url).map(str::to_string)),
                file_uri: url.clone(),
            }),
            ..Default::default()
        },
    }
}

fn content_parts(content: &MessageContent) -> Vec<Part> {
    match content {
        MessageContent::Text(text) if text.is_empty() => Vec::new(),
        MessageContent::Text(text) => vec![Part::text(text.clone())],
        MessageContent::Parts(parts) => parts.iter().map(part_from_ir).collect(),
    }
}

fn function_call_part(id: &str, name: &str, arguments: &Map<String, Value>) -> Part {
    Part {
        function_call: Some(FunctionCall {
            id: Some(id.to_string()).filter(|id| !id.is_empty()),
            name: name.to_string(),
            args: Some(Value::Object(arguments.clone())),
        }),
        ..Default::default()
    }
}

fn assistant_parts(msg: &UnifiedMessage) -> Vec<Part> {
    let mut parts = Vec::new();
    if let Some(reasoning) = msg.reasoning_content.as_ref().filter(|r| !r.is_empty()) {
        parts.push(Part::thought(reasoning.clone()));
    }
    parts.extend(content_parts(&msg.content));
    parts.extend(
        msg.tool_calls
            .iter()
            .map(|c| function_call_part(&c.id, &c.name, &c.arguments)),
    );
    parts
}

pub(crate) fn finish_to_ir(reason: &str, saw_tool_call: bool) -> FinishReason {
    match reason {
        "STOP" if saw_tool_call => FinishReason::ToolCalls,
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        _ => FinishReason::ContentFilter,
    }
}

pub(crate) fn finish_from_ir(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop | FinishReason::ToolCalls => "STOP",
        FinishReason::Length => "MAX_TOKENS",
        FinishReason::ContentFilter => "SAFETY",
    }
}

/// Thoughts are billed as output; any surplus in the total (tool-use prompt
/// tokens) lands on the prompt side.
fn usage_to_ir(usage: &UsageMetadata) -> UnifiedUsage {
    let thoughts = usage.thoughts_token_count;
    UnifiedUsage::new(
        usage.prompt_token_count,
        usage
            .candidates_token_count
            .unwrap_or(0)
            .saturating_add(thoughts.unwrap_or(0)),
    )
    .reconcile_total(Some(usage.total_token_count))
    .with_cache(usage.cached_content_token_count, None)
    .with_reasoning(thoughts)
}

fn usage_from_ir(usage: &UnifiedUsage) -> UsageMetadata {
    UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: Some(usage.visible_completion_tokens()),
        total_token_count: usage.total_tokens,
        cached_content_token_count: usage.cache_read_tokens,
        thoughts_token_count: usage.reasoning_tokens,
        tool_use_prompt_token_count: None,
    }
}

fn error_to_ir(err: GeminiApiError) -> UnifiedError {
    let http = (err.code != 0).then_some(err.code);
    normalize_error(None, err.status, http, err.message, None)
}

fn error_from_ir(err: &UnifiedError) -> GeminiApiError {
    let class = err.class();
    GeminiApiError {
        code: class.http_status(),
        message: err.message.clone(),
        status: Some(class.gemini_status().to_string()),
    }
}

fn strip_model_prefix(model: &str) -> String {
    model.strip_prefix("models/").unwrap_or(model).to_string()
}

impl ProviderAdapter for GeminiAdapter {
    type Request = GenerateContentRequest;
    type Response = GenerateContentResponse;
    type Chunk = GenerateContentResponse;

    const PROVIDER: Provider = Provider::Gemini;

    fn validate(&self, req: &GenerateContentRequest) -> Result<()> {
        require_model(req.model.as_deref(), SOURCE)?;
        require_messages(req.contents.len(), "request.contents", SOURCE)?;
        for (i, content) in req.contents.iter().enumerate() {
            let path = format!("request.contents[{}]", i);
            match content.role.as_deref() {
                None | Some("user") | Some("model") | Some("function") => {}
                Some(other) => {
                    return Err(fail(
                        format!("role must be 'user' or 'model', got '{}'", other),
                        format!("{}.role", path),
                        SOURCE,
                    ))
                }
            }
            if content.parts.is_empty() {
                return Err(fail(
                    "content must have at least one part",
                    format!("{}.parts", path),
                    SOURCE,
                ));
            }
        }
        if let Some(gc) = &req.generation_config {
            check_range(gc.temperature, 0.0, 2.0, "request.generationConfig.temperature", SOURCE)?;
            check_range(gc.top_p, 0.0, 1.0, "request.generationConfig.topP", SOURCE)?;
            if self.config.strict_schemas {
                if let Some(schema) = &gc.response_schema {
                    check_schema(schema, "request.generationConfig.responseSchema", SOURCE)?;
                }
            }
        }
        for (i, tool) in req.tools.iter().enumerate() {
            for (j, decl) in tool.function_declarations.iter().enumerate() {
                let path = format!("request.tools[{}].functionDeclarations[{}]", i, j);
                if decl.name.trim().is_empty() {
                    return Err(fail("function name is required", format!("{}.name", path), SOURCE));
                }
                if self.config.strict_schemas {
                    if let Some(schema) = &decl.parameters {
                        check_schema(schema, &format!("{}.parameters", path), SOURCE)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn to_ir(&self, req: GenerateContentRequest) -> Result<UnifiedRequest> {
        ProviderAdapter::validate(self, &req)?;

        let mut messages = Vec::new();
        if let Some(system) = req.system_instruction {
            for part in system.parts {
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    messages.push(UnifiedMessage::system(text));
                }
            }
        }
        let mut pending = PendingCalls::default();
        for (i, content) in req.contents.into_iter().enumerate() {
            if content.role.as_deref() == Some("model") {
                let path = format!("request.contents[{}]", i);
                messages.push(self.model_content_to_ir(content, &path, &mut pending)?);
            } else {
                self.user_content_to_ir(content, &mut pending, &mut messages);
            }
        }

        let mut tools = Vec::new();
        for tool in req.tools {
            for decl in tool.function_declarations {
                tools.push(UnifiedTool {
                    name: decl.name,
                    description: decl.description,
                    parameters: decl.parameters.map(JsonPayload::from),
                    tool_type: Some("function".into()),
                });
            }
            if tool.google_search.is_some() || tool.google_search_retrieval.is_some() {
                tools.push(UnifiedTool::builtin(BuiltinTool::WebSearch));
            }
            if tool.code_execution.is_some() {
                tools.push(UnifiedTool::builtin(BuiltinTool::CodeExecution));
            }
        }

        let tool_choice = req
            .tool_config
            .and_then(|tc| tc.function_calling_config)
            .and_then(|fc| match fc.mode.as_deref() {
                Some("NONE") => Some(ToolChoice::None),
                Some("ANY") if fc.allowed_function_names.len() == 1 => {
                    fc.allowed_function_names.into_iter().next().map(ToolChoice::Tool)
                }
                Some("ANY") => Some(ToolChoice::Required),
                Some("AUTO") | Some("VALIDATED") => Some(ToolChoice::Auto),
                _ => None,
            });

        if !req.safety_settings.is_empty() {
            tracing::debug!("Gemini safety settings are not carried across providers");
        }
        if req.cached_content.is_some() {
            tracing::warn!("cachedContent reference dropped");
        }

        let mut ir = UnifiedRequest {
            model: req.model.as_deref().map(strip_model_prefix).unwrap_or_default(),
            messages,
            tools,
            tool_choice,
            ..Default::default()
        };
        if let Some(gc) = req.generation_config {
            if gc.candidate_count.map_or(false, |n| n > 1) {
                tracing::warn!("candidateCount > 1 is not carried across providers");
            }
            ir.max_tokens = gc.max_output_tokens;
            ir.temperature = gc.temperature;
            ir.top_p = gc.top_p;
            ir.top_k = gc.top_k;
            ir.stop = gc.stop_sequences;
            ir.presence_penalty = gc.presence_penalty;
            ir.frequency_penalty = gc.frequency_penalty;
            ir.seed = gc.seed;
            ir.response_format = match (gc.response_mime_type.as_deref(), gc.response_schema) {
                (Some(JSON_MIME), Some(schema)) => Some(ResponseFormat::JsonSchema {
                    name: None,
                    schema: JsonPayload::from(schema),
                    strict: None,
                }),
                (Some(JSON_MIME), None) => Some(ResponseFormat::JsonObject),
                (Some("text/plain"), _) => Some(ResponseFormat::Text),
                _ => None,
            };
            ir.reasoning = gc
                .thinking_config
                .and_then(|tc| tc.thinking_budget)
                .and_then(|budget| match budget {
                    b if b > 0 => Some(ReasoningConfig {
                        effort: None,
                        budget_tokens: u32::try_from(b).ok(),
                    }),
                    -1 => Some(ReasoningConfig {
                        effort: Some(ReasoningEffort::Medium),
                        budget_tokens: None,
                    }),
                    _ => None,
                });
        }
        Ok(ir)
    }

    fn from_ir(&self, ir: &UnifiedRequest) -> Result<GenerateContentRequest> {
        ir.validate()?;

        let mut system_parts = Vec::new();
        if let Some(system) = ir.system.as_ref().filter(|s| !s.is_empty()) {
            system_parts.push(Part::text(system.clone()));
        }
        let mut call_names: HashMap<&str, &str> = HashMap::new();
        let mut contents: Vec<Content> = Vec::new();
        for m in &ir.messages {
            let (role, parts) = match m.role {
                Role::System => {
                    let text = m.text();
                    if !text.is_empty() {
                        system_parts.push(Part::text(text));
                    }
                    continue;
                }
                Role::User => ("user", content_parts(&m.content)),
                Role::Assistant => {
                    for c in &m.tool_calls {
                        call_names.insert(c.id.as_str(), c.name.as_str());
                    }
                    ("model", assistant_parts(m))
                }
                Role::Tool => {
                    let name = m
                        .name
                        .as_deref()
                        .or_else(|| {
                            m.tool_call_id
                                .as_deref()
                                .and_then(|id| call_names.get(id).copied())
                        })
                        .ok_or_else(|| {
                            Error::unsupported_capability(
                                Provider::Gemini,
                                "tool result whose function name cannot be resolved",
                                ErrorContext::new()
                                    .with_details(format!("tool_call_id {:?}", m.tool_call_id))
                                    .with_source(SOURCE),
                            )
                        })?;
                    let part = Part {
                        function_response: Some(FunctionResponse {
                            id: m.tool_call_id.clone().filter(|id| !id.is_empty()),
                            name: name.to_string(),
                            response: wrap_response(&m.text()),
                        }),
                        ..Default::default()
                    };
                    ("user", vec![part])
                }
            };
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
                _ => contents.push(Content::new(role, parts)),
            }
        }
        for content in &mut contents {
            if content.parts.is_empty() {
                content.parts.push(Part::text(""));
            }
        }

        let mut declarations = Vec::new();
        let mut tools = Vec::new();
        for t in &ir.tools {
            match t.builtin_kind() {
                Some(BuiltinTool::WebSearch) => tools.push(GeminiTool {
                    google_search: Some(json!({})),
                    ..Default::default()
                }),
                Some(BuiltinTool::CodeExecution) => tools.push(GeminiTool {
                    code_execution: Some(json!({})),
                    ..Default::default()
                }),
                None => declarations.push(FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.parameters_or_empty()),
                }),
            }
        }
        if !declarations.is_empty() {
            tools.insert(
                0,
                GeminiTool {
                    function_declarations: declarations,
                    ..Default::default()
                },
            );
        }

        let tool_config = ir.tool_choice.as_ref().map(|c| {
            let (mode, allowed) = match c {
                ToolChoice::Auto => ("AUTO", Vec::new()),
                ToolChoice::None => ("NONE", Vec::new()),
                ToolChoice::Required => ("ANY", Vec::new()),
                ToolChoice::Tool(name) => ("ANY", vec![name.clone()]),
            };
            ToolConfig {
                function_calling_config: Some(FunctionCallingConfig {
                    mode: Some(mode.into()),
                    allowed_function_names: allowed,
                }),
            }
        });

        let (response_mime_type, response_schema) = match &ir.response_format {
            Some(ResponseFormat::Text) | None => (None, None),
            Some(ResponseFormat::JsonObject) => (Some(JSON_MIME.to_string()), None),
            Some(ResponseFormat::JsonSchema { schema, .. }) => {
                (Some(JSON_MIME.to_string()), Some(schema.to_value()))
            }
        };
        let generation_config = GenerationConfig {
            temperature: ir.temperature,
            top_p: ir.top_p,
            top_k: ir.top_k,
            max_output_tokens: ir.max_tokens,
            candidate_count: None,
            stop_sequences: ir.stop.clone(),
            presence_penalty: ir.presence_penalty,
            frequency_penalty: ir.frequency_penalty,
            seed: ir.seed,
            response_mime_type,
            response_schema,
            thinking_config: ir
                .reasoning
                .as_ref()
                .and_then(ReasoningConfig::effective_budget)
                .map(|budget| ThinkingConfig {
                    thinking_budget: Some(i64::from(budget)),
                    include_thoughts: Some(true),
                }),
        };

        Ok(GenerateContentRequest {
            model: Some(ir.model.clone()),
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| Content {
                role: None,
                parts: system_parts,
            }),
            generation_config: (generation_config != GenerationConfig::default())
                .then_some(generation_config),
            tools,
            tool_config,
            safety_settings: self.safety_settings(),
            cached_content: None,
        })
    }

    fn response_to_ir(&self, resp: GenerateContentResponse) -> Result<UnifiedResponse> {
        if let Some(err) = resp.error {
            return Ok(UnifiedResponse::failure(Provider::Gemini, error_to_ir(err)));
        }
        let mut pending = PendingCalls::default();
        let mut choices = Vec::with_capacity(resp.candidates.len());
        for (i, candidate) in resp.candidates.into_iter().enumerate() {
            let path = format!("response.candidates[{}].content", i);
            let message = match candidate.content {
                Some(content) => self.model_content_to_ir(content, &path, &mut pending)?,
                None => UnifiedMessage::assistant(""),
            };
            let finish_reason = candidate
                .finish_reason
                .as_deref()
                .map(|r| finish_to_ir(r, !message.tool_calls.is_empty()));
            choices.push(UnifiedChoice {
                index: candidate.index.unwrap_or(i as u32),
                message,
                finish_reason,
                logprobs: candidate.logprobs_result,
            });
        }
        if choices.is_empty() {
            if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
                tracing::debug!(reason = %reason, "prompt blocked by Gemini safety filters");
                choices.push(UnifiedChoice::new(
                    0,
                    UnifiedMessage::assistant(""),
                    Some(FinishReason::ContentFilter),
                ));
            }
        }
        Ok(UnifiedResponse {
            id: resp.response_id.unwrap_or_default(),
            provider: Provider::Gemini,
            model: resp.model_version.unwrap_or_default(),
            created: None,
            choices,
            usage: resp.usage_metadata.as_ref().map(usage_to_ir),
            error: None,
        })
    }

    fn response_from_ir(&self, ir: &UnifiedResponse) -> Result<GenerateContentResponse> {
        ir.validate()?;
        if let Some(err) = &ir.error {
            return Ok(GenerateContentResponse {
                error: Some(error_from_ir(err)),
                ..Default::default()
            });
        }
        let candidates = ir
            .choices
            .iter()
            .map(|c| {
                let mut parts = assistant_parts(&c.message);
                if parts.is_empty() {
                    parts.push(Part::text(""));
                }
                Candidate {
                    content: Some(Content::new("model", parts)),
                    finish_reason: c.finish_reason.map(|r| finish_from_ir(r).to_string()),
                    index: Some(c.index),
                    safety_ratings: None,
                    logprobs_result: c.logprobs.clone(),
                }
            })
            .collect();
        Ok(GenerateContentResponse {
            candidates,
            prompt_feedback: None,
            usage_metadata: ir.usage.as_ref().map(usage_from_ir),
            model_version: Some(ir.model.clone()).filter(|m| !m.is_empty()),
            response_id: Some(ir.id.clone()).filter(|id| !id.is_empty()),
            error: None,
        })
    }

    fn chunk_to_ir(
        &self,
        chunk: GenerateContentResponse,
        session: &mut StreamSession,
    ) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();
        let dec = &mut session.decoder;
        if !dec.started {
            dec.started = true;
            events.push(StreamEvent::MessageStart {
                id: chunk.response_id.clone(),
                model: chunk.model_version.as_deref().map(strip_model_prefix),
            });
        }
        if let Some(err) = chunk.error {
            events.push(StreamEvent::Error {
                error: error_to_ir(err),
            });
        }

        let no_candidates = chunk.candidates.is_empty();
        let mut finished = false;
        for (i, candidate) in chunk.candidates.into_iter().enumerate() {
            if candidate.index.unwrap_or(i as u32) != 0 {
                tracing::debug!("only the first streamed candidate is transcoded");
                continue;
            }
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(call) = part.function_call {
                    let tool = dec.allocate_tool();
                    let arguments = match call.args {
                        Some(args @ Value::Object(_)) => args.to_string(),
                        Some(Value::Null) | None => "{}".to_string(),
                        Some(other) => {
                            return Err(Error::malformed_with_context(
                                "function call args must be a JSON object",
                                ErrorContext::new()
                                    .with_details(other.to_string())
                                    .with_source(SOURCE),
                            ))
                        }
                    };
                    events.push(StreamEvent::ToolCallDelta {
                        index: tool,
                        id: Some(
                            call.id
                                .filter(|id| !id.is_empty())
                                .unwrap_or_else(|| synthesize_id(&self.config.tool_call_id_prefix)),
                        ),
                        name: Some(call.name),
                        arguments,
                    });
                    events.push(StreamEvent::ToolCallEnd { index: tool });
                    continue;
                }
                if part.is_thought() {
                    if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                        events.push(StreamEvent::ReasoningDelta { text });
                    }
                    continue;
                }
                match media_or_text_part(part) {
                    Some(UnifiedMessagePart::Text { text }) if !text.is_empty() => {
                        events.push(StreamEvent::text(text));
                    }
                    Some(UnifiedMessagePart::Text { .. }) | None => {}
                    Some(other) => {
                        tracing::warn!(part = ?other, "streamed media part dropped");
                    }
                }
            }
            if let Some(reason) = candidate.finish_reason {
                finished = true;
                events.push(StreamEvent::Finish {
                    reason: finish_to_ir(&reason, dec.saw_tool_call),
                });
            }
        }
        if no_candidates
            && chunk
                .prompt_feedback
                .as_ref()
                .map_or(false, |f| f.block_reason.is_some())
        {
            finished = true;
            events.push(StreamEvent::Finish {
                reason: FinishReason::ContentFilter,
            });
        }
        if let Some(usage) = chunk.usage_metadata {
            if finished || no_candidates {
                events.push(StreamEvent::Usage {
                    usage: usage_to_ir(&usage),
                });
            }
        }
        Ok(events)
    }

    fn chunk_from_ir(
        &self,
        event: &StreamEvent,
        session: &mut StreamSession,
    ) -> Result<Vec<GenerateContentResponse>> {
        if !session.encoder.started {
            let id = session.message_id().unwrap_or_default().to_string();
            let model = session.model().unwrap_or_default().to_string();
            let enc = &mut session.encoder;
            enc.started = true;
            enc.id = id;
            enc.model = model;
        }

        let out = match event {
            StreamEvent::MessageStart { .. } => Vec::new(),
            StreamEvent::TextDelta { text } => {
                vec![candidate_chunk(session, vec![Part::text(text.clone())], None)]
            }
            StreamEvent::ReasoningDelta { text } => {
                vec![candidate_chunk(session, vec![Part::thought(text.clone())], None)]
            }
            StreamEvent::ToolCallDelta { .. } => Vec::new(),
            StreamEvent::ToolCallEnd { index } => {
                let parts = flush_tool_calls(session, Some(*index))?;
                if parts.is_empty() {
                    Vec::new()
                } else {
                    vec![candidate_chunk(session, parts, None)]
                }
            }
            StreamEvent::Finish { reason } => {
                let parts = flush_tool_calls(session, None)?;
                session.encoder.finish = Some(*reason);
                vec![candidate_chunk(
                    session,
                    parts,
                    Some(finish_from_ir(*reason).to_string()),
                )]
            }
            StreamEvent::Usage { usage } => {
                let mut chunk = base_chunk(session);
                chunk.usage_metadata = Some(usage_from_ir(usage));
                vec![chunk]
            }
            StreamEvent::Error { error } => {
                let mut chunk = base_chunk(session);
                chunk.error = Some(error_from_ir(error));
                vec![chunk]
            }
            StreamEvent::StreamEnd => {
                let parts = flush_tool_calls(session, None)?;
                if parts.is_empty() {
                    Vec::new()
                } else {
                    vec![candidate_chunk(session, parts, None)]
                }
            }
        };
        Ok(out)
    }
}

fn base_chunk(session: &StreamSession) -> GenerateContentResponse {
    let enc = &session.encoder;
    GenerateContentResponse {
        model_version: Some(enc.model.clone()).filter(|m| !m.is_empty()),
        response_id: Some(enc.id.clone()).filter(|id| !id.is_empty()),
        ..Default::default()
    }
}

fn candidate_chunk(
    session: &StreamSession,
    parts: Vec<Part>,
    finish_reason: Option<String>,
) -> GenerateContentResponse {
    let mut chunk = base_chunk(session);
    chunk.candidates = vec![Candidate {
        content: (!parts.is_empty()).then(|| Content::new("model", parts)),
        finish_reason,
        index: Some(0),
        safety_ratings: None,
        logprobs_result: None,
    }];
    chunk
}

/// Emit completed tool calls not yet sent, as whole `functionCall` parts.
fn flush_tool_calls(session: &mut StreamSession, only: Option<u32>) -> Result<Vec<Part>> {
    let ready: Vec<u32> = session
        .accumulator()
        .indices()
        .filter(|i| only.map_or(true, |o| o == *i))
        .filter(|i| !session.encoder.emitted_tools.contains(i))
        .filter(|i| session.accumulator().get(*i).map_or(false, |c| c.complete))
        .collect();
    let mut parts = Vec::with_capacity(ready.len());
    for index in ready {
        if let Some(call) = session.accumulator().get(index) {
            let call = call.to_tool_call()?;
            parts.push(function_call_part(&call.id, &call.name, &call.arguments));
        }
        session.encoder.emitted_tools.insert(index);
    }
    Ok(parts)
}
