//! Tool calling definitions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, ErrorContext};
use crate::Result;

/// Tool-call arguments: a key-unique JSON object.
pub type ToolArguments = Map<String, Value>;

/// JSON blob that is either a typed object mapping or passed through opaquely.
///
/// Object-shaped schemas are inspected structurally (built-in detection,
/// schema checks); everything else travels untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonPayload {
    Object(Map<String, Value>),
    Opaque(Value),
}

impl JsonPayload {
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            JsonPayload::Object(map) => Some(map),
            JsonPayload::Opaque(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            JsonPayload::Object(map) => Value::Object(map.clone()),
            JsonPayload::Opaque(v) => v.clone(),
        }
    }

    /// Empty object schema `{"type": "object", "properties": {}}`.
    pub fn empty_object_schema() -> Self {
        let mut map = Map::new();
        map.insert("type".into(), Value::String("object".into()));
        map.insert("properties".into(), Value::Object(Map::new()));
        JsonPayload::Object(map)
    }
}

impl From<Value> for JsonPayload {
    fn from(v: Value) -> Self {
        match v {
            Value::Object(map) => JsonPayload::Object(map),
            other => JsonPayload::Opaque(other),
        }
    }
}

/// Built-in tools that providers run on their own infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    WebSearch,
    CodeExecution,
}

const WEB_SEARCH_NAMES: &[&str] = &[
    "google_search",
    "googleSearch",
    "web_search",
    "search",
    "google_search_retrieval",
    "googleSearchRetrieval",
];
const CODE_EXECUTION_NAMES: &[&str] = &[
    "code_execution",
    "codeExecution",
    "code_interpreter",
];
const WEB_SEARCH_TYPES: &[&str] = &[
    "web_search_20250305",
    "web_search_preview",
    "web_search",
    "google_search",
];
const CODE_EXECUTION_TYPES: &[&str] = &[
    "code_execution_20250522",
    "code_execution_20250825",
    "code_interpreter",
    "code_execution",
];

impl BuiltinTool {
    /// Canonical tool name used in the IR.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            BuiltinTool::WebSearch => "web_search",
            BuiltinTool::CodeExecution => "code_execution",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        if WEB_SEARCH_NAMES.contains(&name) {
            Some(BuiltinTool::WebSearch)
        } else if CODE_EXECUTION_NAMES.contains(&name) {
            Some(BuiltinTool::CodeExecution)
        } else {
            None
        }
    }

    pub fn from_type(tool_type: &str) -> Option<Self> {
        if WEB_SEARCH_TYPES.contains(&tool_type) {
            Some(BuiltinTool::WebSearch)
        } else if CODE_EXECUTION_TYPES.contains(&tool_type) {
            Some(BuiltinTool::CodeExecution)
        } else {
            None
        }
    }

    /// Name alias first, then the provider type tag.
    pub fn detect(name: &str, tool_type: Option<&str>) -> Option<Self> {
        Self::from_name(name).or_else(|| tool_type.and_then(Self::from_type))
    }
}

/// Tool declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the parameters (user-defined functions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonPayload>,
    /// Provider type tag, e.g. `function` or `web_search_20250305`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<String>,
}

impl UnifiedTool {
    pub fn function(
        name: impl Into<String>,
        description: Option<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description,
            parameters: Some(parameters.into()),
            tool_type: Some("function".into()),
        }
    }

    pub fn builtin(kind: BuiltinTool) -> Self {
        Self {
            name: kind.canonical_name().to_string(),
            description: None,
            parameters: None,
            tool_type: None,
        }
    }

    /// Built-in identity of this tool, if any.
    pub fn builtin_kind(&self) -> Option<BuiltinTool> {
        BuiltinTool::detect(&self.name, self.tool_type.as_deref())
    }

    /// Parameters schema, defaulting to an empty object schema.
    pub fn parameters_or_empty(&self) -> Value {
        self.parameters
            .clone()
            .unwrap_or_else(JsonPayload::empty_object_schema)
            .to_value()
    }
}

/// Tool call (invocation from model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl UnifiedToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments in the string-encoded form used by OpenAI.
    pub fn encoded_arguments(&self) -> String {
        encode_arguments(&self.arguments)
    }
}

/// Parse a string-encoded argument object.
///
/// Blank input is an empty object; anything that is not a JSON object is rejected.
pub fn parse_arguments(raw: &str) -> Result<ToolArguments> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::malformed_with_context(
            "tool call arguments must be a JSON object",
            ErrorContext::new().with_details(format!("got {}", json_kind(&other))),
        )),
        Err(e) => Err(Error::malformed_with_context(
            "tool call arguments are not valid JSON",
            ErrorContext::new().with_details(e.to_string()),
        )),
    }
}

/// Accept an already-decoded value as arguments (Claude `input`, Gemini `args`).
pub fn arguments_from_value(value: &Value) -> Result<ToolArguments> {
    match value {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::String(s) => parse_arguments(s),
        other => Err(Error::malformed_with_context(
            "tool call arguments must be a JSON object",
            ErrorContext::new().with_details(format!("got {}", json_kind(other))),
        )),
    }
}

pub fn encode_arguments(args: &ToolArguments) -> String {
    Value::Object(args.clone()).to_string()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Tool-choice directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Tool(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_alias_detection() {
        for name in ["google_search", "web_search", "search"] {
            assert_eq!(BuiltinTool::from_name(name), Some(BuiltinTool::WebSearch));
        }
        assert_eq!(
            BuiltinTool::detect("my_search", Some("web_search_20250305")),
            Some(BuiltinTool::WebSearch)
        );
        assert_eq!(BuiltinTool::detect("get_weather", Some("function")), None);
    }

    #[test]
    fn test_name_alias_wins_over_type() {
        assert_eq!(
            BuiltinTool::detect("code_execution", Some("web_search_20250305")),
            Some(BuiltinTool::CodeExecution)
        );
    }

    #[test]
    fn test_parse_arguments() {
        let args = parse_arguments(r#"{"location":"NYC","days":3}"#).unwrap();
        assert_eq!(args["location"], "NYC");
        assert!(parse_arguments("   ").unwrap().is_empty());
        assert!(parse_arguments("[1,2]").is_err());
        assert!(parse_arguments("{\"a\":").is_err());
    }

    #[test]
    fn test_argument_encoding_reparses_equal() {
        let call = UnifiedToolCall::new(
            "call_1",
            "lookup",
            json!({"q": "rust", "filters": {"lang": ["en", "de"]}, "n": 2})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let reparsed = parse_arguments(&call.encoded_arguments()).unwrap();
        assert_eq!(reparsed, call.arguments);
    }

    #[test]
    fn test_json_payload_untagged() {
        let obj: JsonPayload = serde_json::from_value(json!({"type": "object"})).unwrap();
        assert!(obj.as_object().is_some());
        let opaque: JsonPayload = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(opaque, JsonPayload::Opaque(json!(true)));
    }
}
