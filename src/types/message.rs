//! Unified message format

use serde::{Deserialize, Serialize};

use super::tool::UnifiedToolCall;
use crate::utils::data_url;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Message content: flat text or an ordered list of parts.
///
/// The two forms are mutually exclusive. Adapters collapse a part list that
/// holds only text into [`MessageContent::Text`], so a message never carries a
/// stale text copy next to its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<UnifiedMessagePart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text(text.into())
    }

    /// Build content from parts in document order.
    ///
    /// Text-only part lists collapse into a single string (concatenated in
    /// order); anything containing a non-text part stays a part list.
    pub fn from_parts(parts: Vec<UnifiedMessagePart>) -> Self {
        if parts.iter().all(|p| matches!(p, UnifiedMessagePart::Text { .. })) {
            let mut text = String::new();
            for p in &parts {
                if let UnifiedMessagePart::Text { text: t } = p {
                    text.push_str(t);
                }
            }
            MessageContent::Text(text)
        } else {
            MessageContent::Parts(parts)
        }
    }

    /// Concatenation of all text in document order.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    UnifiedMessagePart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    pub fn has_non_text_parts(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|p| !matches!(p, UnifiedMessagePart::Text { .. })),
        }
    }

    /// Expand into parts: a non-empty flat string becomes one text part.
    pub fn to_parts(&self) -> Vec<UnifiedMessagePart> {
        match self {
            MessageContent::Text(s) if s.is_empty() => Vec::new(),
            MessageContent::Text(s) => vec![UnifiedMessagePart::text(s.clone())],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedMessage {
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Only valid on assistant messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<UnifiedToolCall>,
    /// Only valid on tool messages; links the result to its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Model reasoning / thinking text, when the provider exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl UnifiedMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, MessageContent::Text(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_parts(role: Role, parts: Vec<UnifiedMessagePart>) -> Self {
        Self::new(role, MessageContent::from_parts(parts))
    }

    pub fn with_tool_calls(mut self, calls: Vec<UnifiedToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content.as_text()
    }

    /// True when the message carries nothing a provider could render.
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
            && self.tool_calls.is_empty()
            && self.tool_call_id.is_none()
            && self.reasoning_content.is_none()
    }
}

/// Media payload: inline base64 data or a URL reference, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 {
        media_type: String,
        data: String,
    },
    Url {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

impl MediaSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        MediaSource::Base64 {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        MediaSource::Url {
            url: url.into(),
            media_type: None,
        }
    }

    /// Classify a URL string: `data:` URLs become inline data, anything else a reference.
    pub fn from_url_or_data(url: &str) -> Self {
        match data_url::parse(url) {
            Some(d) => MediaSource::Base64 {
                media_type: d.media_type,
                data: d.data,
            },
            None => MediaSource::url(url),
        }
    }

    pub fn media_type(&self) -> Option<&str> {
        match self {
            MediaSource::Base64 { media_type, .. } => Some(media_type.as_str()),
            MediaSource::Url { media_type, .. } => media_type.as_deref(),
        }
    }

    /// Render as a URL string (`data:` URL for inline data).
    pub fn to_url(&self) -> String {
        match self {
            MediaSource::Base64 { media_type, data } => data_url::format(media_type, data),
            MediaSource::Url { url, .. } => url.clone(),
        }
    }
}

/// Content part (multimodal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedMessagePart {
    Text {
        text: String,
    },
    Image {
        source: MediaSource,
    },
    File {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Document {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl UnifiedMessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        UnifiedMessagePart::Text { text: text.into() }
    }

    pub fn image(source: MediaSource) -> Self {
        UnifiedMessagePart::Image { source }
    }

    pub fn source(&self) -> Option<&MediaSource> {
        match self {
            UnifiedMessagePart::Text { .. } => None,
            UnifiedMessagePart::Image { source }
            | UnifiedMessagePart::File { source, .. }
            | UnifiedMessagePart::Document { source, .. } => Some(source),
        }
    }

    /// Pick image / document / file from a MIME type.
    pub fn from_media(source: MediaSource) -> Self {
        let mime = source.media_type().unwrap_or_default().to_ascii_lowercase();
        if mime.starts_with("image/") {
            UnifiedMessagePart::Image { source }
        } else if mime == "application/pdf" || mime.starts_with("text/") {
            UnifiedMessagePart::Document {
                source,
                title: None,
            }
        } else {
            UnifiedMessagePart::File {
                source,
                filename: None,
            }
        }
    }
}
