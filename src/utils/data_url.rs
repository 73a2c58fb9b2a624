//! `data:` URL helpers and media-type guessing for URL references.

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

static DATA_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^data:([^;,]+)((?:;[^;,]*)*),(.*)$").ok());

/// Inline payload carried by a base64 `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub media_type: String,
    pub data: String,
}

/// Parse `data:<media-type>[;params];base64,<data>`.
///
/// Only base64-encoded data URLs are recognized; anything else is left to be
/// treated as a plain URL reference.
pub fn parse(url: &str) -> Option<DataUrl> {
    let re = DATA_URL.as_ref()?;
    let caps = re.captures(url.trim())?;
    let params = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    if !params.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        return None;
    }
    Some(DataUrl {
        media_type: caps.get(1)?.as_str().to_ascii_lowercase(),
        data: caps.get(3)?.as_str().to_string(),
    })
}

pub fn format(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

pub fn encode_text(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Decode base64 text data; `None` when the data is not valid base64 UTF-8.
pub fn decode_text(data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

/// Best-effort MIME type from a URL's file extension.
pub fn guess_media_type(raw: &str) -> Option<&'static str> {
    let parsed = url::Url::parse(raw).ok()?;
    let path = parsed.path().to_ascii_lowercase();
    let ext = path.rsplit_once('.')?.1;
    let mime = match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}
