// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire-format message model shared between the orchestrator and the model
//! provider boundary.
//!
//! Chat messages are open-form records in most provider APIs (a `role` plus
//! role-specific fields and free metadata).  Here they are modeled as an
//! explicit tagged variant so the rest of the crate can pattern-match instead
//! of probing untyped JSON; provider adapters translate to the wire shape at
//! the boundary.

use serde::{Deserialize, Serialize};

// ─── Content part types ───────────────────────────────────────────────────────

/// A single content part in a multi-part user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image {
        /// Data URL (`data:<mime>;base64,<b64>`).
        image_url: String,
        /// Vision detail level: `"low"`, `"high"`, or `"auto"`.
        ///
        /// `"low"` is always 85 tokens regardless of image size; anything
        /// else is estimated at 765 tokens (conservative upper bound).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image { image_url: image_url.into(), detail: None }
    }

    pub fn image_with_detail(image_url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Image { image_url: image_url.into(), detail: Some(detail.into()) }
    }
}

/// Content returned by a tool — either plain text or structured parts
/// (text + image) for multimodal tool output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Parts(Vec<ToolContentPart>),
}

impl ToolResultContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Parts(_) => None,
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => vec![],
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ToolContentPart::Image { image_url } => Some(image_url.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl From<String> for ToolResultContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ToolResultContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl std::fmt::Display for ToolResultContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(t) => write!(f, "{t}"),
            Self::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|p| match p {
                        ToolContentPart::Text { text } => Some(text.as_str()),
                        ToolContentPart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                write!(f, "{text}")
            }
        }
    }
}

/// A single content part in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContentPart {
    Text { text: String },
    Image { image_url: String },
}

// ─── Data URL helpers ─────────────────────────────────────────────────────────

/// Parse a data URL of the form `data:<mime>;base64,<b64>`.
///
/// Returns `Err` for anything that isn't a data URL so callers can fall back
/// to treating the string as a plain HTTPS URL (or drop it silently, as the
/// context builder does for media that doesn't resolve to an `image/*` file).
pub fn parse_data_url_parts(url: &str) -> Result<(String, String), &'static str> {
    let rest = url.strip_prefix("data:").ok_or("not a data URL")?;
    let (meta, b64) = rest.split_once(',').ok_or("malformed data URL")?;
    let mime = meta.strip_suffix(";base64").unwrap_or(meta).to_string();
    Ok((mime, b64.to_string()))
}

// ─── Message types ────────────────────────────────────────────────────────────

/// One request for the model to invoke a tool, as returned by the provider.
///
/// Duplicate `id` values within one response are permitted by the provider
/// contract; the orchestrator processes calls in the order given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// A single message in the conversation history, modeled as a tagged variant
/// rather than a duck-typed record so role-specific fields are statically
/// known at every call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { parts: Vec<ContentPart> },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning_content: Option<String>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: ToolResultContent,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::User { parts: vec![ContentPart::text(text)] }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self::User { parts }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant { content: Some(text.into()), tool_calls: Vec::new(), reasoning_content: None }
    }

    pub fn assistant_with_tool_calls(
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self::Assistant { content, tool_calls, reasoning_content: None }
    }

    pub fn tool_result(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool { tool_call_id: call_id.into(), name: name.into(), content: ToolResultContent::Text(content.into()) }
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Return the plain text of this message, if it reduces to a single
    /// text part (or a system/assistant string).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::System { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::User { parts } if parts.len() == 1 => match &parts[0] {
                ContentPart::Text { text } => Some(text),
                _ => None,
            },
            Self::Tool { content, .. } => content.as_text(),
            _ => None,
        }
    }

    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::User { parts } => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image { image_url, .. } => Some(image_url.as_str()),
                    _ => None,
                })
                .collect(),
            Self::Tool { content, .. } => content.image_urls(),
            _ => vec![],
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        matches!(self, Self::Assistant { tool_calls, .. } if !tool_calls.is_empty())
    }

    /// Approximate token count used for context management: chars/4 for
    /// text, with OpenAI's vision estimates for image parts (85 tokens for
    /// `detail=low`, 765 otherwise).
    pub fn approx_tokens(&self) -> usize {
        let chars = match self {
            Self::System { content } => content.len(),
            Self::User { parts } => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::Image { detail, .. } => {
                        let tokens = if detail.as_deref() == Some("low") { 85 } else { 765 };
                        tokens * 4
                    }
                })
                .sum(),
            Self::Assistant { content, tool_calls, .. } => {
                let text_len = content.as_deref().map(str::len).unwrap_or(0);
                let calls_len: usize = tool_calls.iter().map(|c| c.name.len() + c.arguments.len()).sum();
                text_len + calls_len
            }
            Self::Tool { content, .. } => match content {
                ToolResultContent::Text(t) => t.len(),
                ToolResultContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ToolContentPart::Text { text } => text.len(),
                        ToolContentPart::Image { .. } => 765 * 4,
                    })
                    .sum(),
            },
        };
        (chars / 4).max(1)
    }
}

/// A tool schema exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token usage from one model call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl Usage {
    pub fn merge(&mut self, other: &Usage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
    }
}

/// The non-streaming result of one `Provider::chat` call.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub reasoning_content: Option<String>,
    pub usage: Usage,
    pub finish_reason: String,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role_name(), "user");
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn message_assistant_sets_role_and_text() {
        let m = Message::assistant("reply");
        assert_eq!(m.role_name(), "assistant");
        assert_eq!(m.as_text(), Some("reply"));
        assert!(!m.has_tool_calls());
    }

    #[test]
    fn message_system_sets_role_and_text() {
        let m = Message::system("prompt");
        assert_eq!(m.role_name(), "system");
        assert_eq!(m.as_text(), Some("prompt"));
    }

    #[test]
    fn message_tool_result_sets_role_and_content() {
        let m = Message::tool_result("id-1", "search", "output");
        assert_eq!(m.role_name(), "tool");
        match &m {
            Message::Tool { tool_call_id, name, content } => {
                assert_eq!(tool_call_id, "id-1");
                assert_eq!(name, "search");
                assert_eq!(content.as_text(), Some("output"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn message_user_with_parts_image() {
        let parts = vec![ContentPart::text("what is this?"), ContentPart::image("data:image/png;base64,XYZ")];
        let m = Message::user_with_parts(parts);
        assert_eq!(m.image_urls(), vec!["data:image/png;base64,XYZ"]);
        assert!(m.as_text().is_none());
    }

    #[test]
    fn message_assistant_with_tool_calls_has_tool_calls() {
        let m = Message::assistant_with_tool_calls(
            None,
            vec![ToolCallRequest { id: "1".into(), name: "search".into(), arguments: "{}".into() }],
        );
        assert!(m.has_tool_calls());
    }

    // ── Token approximation ───────────────────────────────────────────────────

    #[test]
    fn approx_tokens_text_divides_by_four() {
        let m = Message::user("12345678");
        assert_eq!(m.approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        let m = Message::user("hi");
        assert_eq!(m.approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_empty_text_is_one() {
        let m = Message::user("");
        assert_eq!(m.approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_tool_call_uses_name_plus_args() {
        let m = Message::assistant_with_tool_calls(
            None,
            vec![ToolCallRequest { id: "id".into(), name: "aaaa".into(), arguments: "bbbbbbbb".into() }],
        );
        assert_eq!(m.approx_tokens(), 3);
    }

    #[test]
    fn approx_tokens_tool_result_uses_content() {
        let m = Message::tool_result("id", "t", "1234567890123456");
        assert_eq!(m.approx_tokens(), 4);
    }

    #[test]
    fn approx_tokens_image_part_default_uses_high_estimate() {
        let parts = vec![ContentPart::image("data:image/png;base64,A")];
        let m = Message::user_with_parts(parts);
        assert_eq!(m.approx_tokens(), 765);
    }

    #[test]
    fn approx_tokens_image_detail_low_uses_85_tokens() {
        let parts = vec![ContentPart::image_with_detail("data:image/png;base64,A", "low")];
        let m = Message::user_with_parts(parts);
        assert_eq!(m.approx_tokens(), 85);
    }

    // ── Serialisation round-trip ──────────────────────────────────────────────

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("test payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role_name(), "user");
        assert_eq!(decoded.as_text(), Some("test payload"));
    }

    #[test]
    fn tool_schema_serialises_correctly() {
        let ts = ToolSchema {
            name: "my_tool".into(),
            description: "desc".into(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("my_tool"));
        assert!(json.contains("desc"));
    }

    #[test]
    fn data_url_parses_mime_and_base64() {
        let (mime, b64) = parse_data_url_parts("data:image/png;base64,QUJD").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(b64, "QUJD");
    }

    #[test]
    fn data_url_rejects_plain_url() {
        assert!(parse_data_url_parts("https://example.com/a.png").is_err());
    }
}
