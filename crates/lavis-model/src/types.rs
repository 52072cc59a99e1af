use serde::{Deserialize, Serialize};

// ─── Content part types ───────────────────────────────────────────────────────

/// A single content part in a multi-part message.
///
/// Used for user and observation messages that mix text with a screenshot.
/// Images are always represented as data URLs (`data:<mime>;base64,<b64>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image {
        /// Data URL (`data:image/png;base64,...`).
        image_url: String,
    },
}

impl ContentPart {
    /// Convenience constructor for a plain text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Convenience constructor for an image part.
    pub fn image(image_url: impl Into<String>) -> Self {
        Self::Image {
            image_url: image_url.into(),
        }
    }
}

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: ChatContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn tool_result(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: ChatContent::ToolResult {
                tool_call_id: id.into(),
                content: content.into(),
            },
        }
    }

    /// Assistant message carrying one tool-call request.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: ChatContent::ToolCall {
                tool_call_id: id.into(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            },
        }
    }

    /// Construct a user message from a list of content parts (text + images).
    ///
    /// An empty list falls back to `ChatContent::Text("")`; a single text
    /// part collapses to `ChatContent::Text`.
    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: Self::collapse(parts),
        }
    }

    fn collapse(parts: Vec<ContentPart>) -> ChatContent {
        if parts.is_empty() {
            ChatContent::Text(String::new())
        } else if parts.len() == 1 {
            if let ContentPart::Text { text } = &parts[0] {
                ChatContent::Text(text.clone())
            } else {
                ChatContent::Parts(parts)
            }
        } else {
            ChatContent::Parts(parts)
        }
    }

    /// Return the plain text of this message, if it has exactly one text part.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ChatContent::Text(t) => Some(t),
            ChatContent::Parts(parts) if parts.len() == 1 => match &parts[0] {
                ContentPart::Text { text } => Some(text),
                _ => None,
            },
            _ => None,
        }
    }

    /// Collect all image URLs present in this message.
    pub fn image_urls(&self) -> Vec<&str> {
        match &self.content {
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Image { image_url } => Some(image_url.as_str()),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    /// Approximate token count used for context accounting.
    ///
    /// Uses a 4-chars-per-token heuristic for text.  Each retained image is
    /// charged a flat ~1500 tokens, the typical cost of a screenshot-sized
    /// multimodal block.
    pub fn approx_tokens(&self) -> usize {
        const IMAGE_TOKENS: usize = 1500;
        let chars = match &self.content {
            ChatContent::Text(t) => t.len(),
            ChatContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::Image { .. } => IMAGE_TOKENS * 4,
                })
                .sum(),
            ChatContent::ToolCall { function, .. } => {
                function.name.len() + function.arguments.len()
            }
            ChatContent::ToolResult { content, .. } => content.len(),
        };
        (chars / 4).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// The content of a message.
///
/// - `Text` – simple string (most messages)
/// - `Parts` – mixed text + image parts for multimodal turns
/// - `ToolCall` – the assistant requests a tool invocation
/// - `ToolResult` – the stringified result of a tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
    ToolCall {
        tool_call_id: String,
        function: FunctionCall,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    /// Correlation id, forwarded verbatim into the matching tool result.
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.  Providers that stream argument fragments
    /// resolve them to a single object before returning.
    pub args: serde_json::Value,
}

/// The model's reply to one [`ChatRequest`].
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Final text, when the model produced any.
    pub text: Option<String>,
    /// Tool invocations requested this turn, in emission order.
    pub tool_requests: Vec<ToolRequest>,
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Token usage from one turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Message construction ──────────────────────────────────────────────────

    #[test]
    fn message_user_sets_role_and_text() {
        let m = ChatMessage::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn message_tool_result_sets_role_and_content() {
        let m = ChatMessage::tool_result("id-1", "output");
        assert_eq!(m.role, Role::Tool);
        match &m.content {
            ChatContent::ToolResult {
                tool_call_id,
                content,
            } => {
                assert_eq!(tool_call_id, "id-1");
                assert_eq!(content, "output");
            }
            _ => panic!("wrong content variant"),
        }
    }

    #[test]
    fn user_with_single_text_part_collapses() {
        let m = ChatMessage::user_with_parts(vec![ContentPart::text("hi")]);
        assert_eq!(m.as_text(), Some("hi"));
    }

    #[test]
    fn user_with_image_part_reports_url() {
        let m = ChatMessage::user_with_parts(vec![
            ContentPart::text("what is this?"),
            ContentPart::image("data:image/png;base64,XYZ"),
        ]);
        assert_eq!(m.image_urls(), vec!["data:image/png;base64,XYZ"]);
        assert!(m.as_text().is_none());
    }

    // ── Token approximation ───────────────────────────────────────────────────

    #[test]
    fn approx_tokens_text_divides_by_four() {
        assert_eq!(ChatMessage::user("12345678").approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(ChatMessage::user("").approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_image_is_flat_rate() {
        let m = ChatMessage::user_with_parts(vec![ContentPart::image("data:image/png;base64,A")]);
        assert_eq!(m.approx_tokens(), 1500);
    }

    #[test]
    fn approx_tokens_tool_call_uses_name_plus_args() {
        let m = ChatMessage::tool_call("id", "aaaa", "bbbbbbbb");
        assert_eq!(m.approx_tokens(), 3);
    }

    // ── Serialisation ─────────────────────────────────────────────────────────

    #[test]
    fn message_serialises_and_deserialises() {
        let original = ChatMessage::user("test payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::User);
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
}
