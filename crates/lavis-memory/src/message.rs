// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use lavis_model::{ChatMessage, ContentPart};

/// One tool-call request as recorded in conversation memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequestRecord {
    /// Correlation id from the model.
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments blob.
    pub arguments: String,
}

/// The kind-specific payload of a stored message.
///
/// Persistence projects each variant onto a single row; prompt assembly
/// renders each variant into one or more wire messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageBody {
    UserText {
        text: String,
    },
    UserMultimodal {
        text: String,
        image_id: String,
    },
    AssistantText {
        text: String,
    },
    AssistantToolCalls {
        requests: Vec<ToolRequestRecord>,
    },
    ToolResult {
        /// Cites the tool-call id of an earlier assistant message.
        request_id: String,
        content: String,
    },
    SystemObservation {
        text: String,
        image_id: Option<String>,
    },
}

/// One row of the conversation: body plus turn bookkeeping and the inline
/// image payload (present until evicted or compacted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub body: MessageBody,
    /// Base64 PNG bytes while held inline.  `None` once the payload has been
    /// evicted or archived; the image id in the body remains valid either
    /// way so cold storage can resolve bytes on demand.
    pub image_base64: Option<String>,
    pub token_estimate: usize,
    pub turn_id: String,
    /// Position within the turn, 0..n-1.
    pub turn_pos: u32,
    pub is_compressed: bool,
}

/// The string substituted for evicted image bytes.
pub fn placeholder(image_id: &str) -> String {
    format!("[Visual_Placeholder: {image_id}]")
}

impl StoredMessage {
    pub fn new(body: MessageBody, turn_id: impl Into<String>, turn_pos: u32) -> Self {
        let mut msg = Self {
            body,
            image_base64: None,
            token_estimate: 0,
            turn_id: turn_id.into(),
            turn_pos,
            is_compressed: false,
        };
        msg.token_estimate = msg.estimate_tokens();
        msg
    }

    pub fn with_image(mut self, base64: impl Into<String>) -> Self {
        self.image_base64 = Some(base64.into());
        self.token_estimate = self.estimate_tokens();
        self
    }

    /// Image id referenced by this message, if any.
    pub fn image_id(&self) -> Option<&str> {
        match &self.body {
            MessageBody::UserMultimodal { image_id, .. } => Some(image_id),
            MessageBody::SystemObservation { image_id, .. } => image_id.as_deref(),
            _ => None,
        }
    }

    /// Primary text of the body (used for exception-frame matching and
    /// history display).
    pub fn text_content(&self) -> &str {
        match &self.body {
            MessageBody::UserText { text }
            | MessageBody::UserMultimodal { text, .. }
            | MessageBody::AssistantText { text }
            | MessageBody::SystemObservation { text, .. } => text,
            MessageBody::ToolResult { content, .. } => content,
            MessageBody::AssistantToolCalls { .. } => "",
        }
    }

    /// Row-projection kind tag.
    pub fn kind(&self) -> &'static str {
        match &self.body {
            MessageBody::UserText { .. } => "user",
            MessageBody::UserMultimodal { .. } => "user_multimodal",
            MessageBody::AssistantText { .. } => "assistant",
            MessageBody::AssistantToolCalls { .. } => "assistant_tool_calls",
            MessageBody::ToolResult { .. } => "tool_result",
            MessageBody::SystemObservation { .. } => "observation",
        }
    }

    /// ~4 chars/token for text; a flat 1500 tokens per inline image.
    pub fn estimate_tokens(&self) -> usize {
        let mut chars = match &self.body {
            MessageBody::UserText { text }
            | MessageBody::UserMultimodal { text, .. }
            | MessageBody::AssistantText { text }
            | MessageBody::SystemObservation { text, .. } => text.len(),
            MessageBody::ToolResult { content, .. } => content.len(),
            MessageBody::AssistantToolCalls { requests } => requests
                .iter()
                .map(|r| r.name.len() + r.arguments.len())
                .sum(),
        };
        if self.image_base64.is_some() {
            chars += 1500 * 4;
        }
        (chars / 4).max(1)
    }

    /// Render for prompt assembly.
    ///
    /// `AssistantToolCalls` expands to one wire message per request (the
    /// parallel-tool-call wire format wants them separate); everything else
    /// maps 1:1.  Observations render as user-role messages — they carry
    /// images, which system-role wire messages cannot.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        match &self.body {
            MessageBody::UserText { text } => vec![ChatMessage::user(text.clone())],
            MessageBody::UserMultimodal { text, image_id } => {
                vec![multimodal(text, image_id, &self.image_base64)]
            }
            MessageBody::AssistantText { text } => vec![ChatMessage::assistant(text.clone())],
            MessageBody::AssistantToolCalls { requests } => requests
                .iter()
                .map(|r| ChatMessage::tool_call(&r.id, &r.name, &r.arguments))
                .collect(),
            MessageBody::ToolResult {
                request_id,
                content,
            } => vec![ChatMessage::tool_result(request_id, content.clone())],
            MessageBody::SystemObservation { text, image_id } => match image_id {
                Some(id) => vec![multimodal(text, id, &self.image_base64)],
                None => vec![ChatMessage::user(text.clone())],
            },
        }
    }
}

fn multimodal(text: &str, image_id: &str, image_base64: &Option<String>) -> ChatMessage {
    match image_base64 {
        Some(b64) => ChatMessage::user_with_parts(vec![
            ContentPart::text(text),
            ContentPart::image(format!("data:image/png;base64,{b64}")),
        ]),
        // Payload evicted — keep the reference so the reader knows a frame
        // existed here and cold storage can resolve it.
        None => ChatMessage::user(format!("{text}\n{}", placeholder(image_id))),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> StoredMessage {
        StoredMessage::new(MessageBody::UserText { text: text.into() }, "t1", 0)
    }

    #[test]
    fn placeholder_format_is_stable() {
        assert_eq!(placeholder("img-abc"), "[Visual_Placeholder: img-abc]");
    }

    #[test]
    fn image_id_only_on_visual_variants() {
        assert!(user("x").image_id().is_none());
        let m = StoredMessage::new(
            MessageBody::UserMultimodal {
                text: "x".into(),
                image_id: "img-1".into(),
            },
            "t1",
            0,
        );
        assert_eq!(m.image_id(), Some("img-1"));
    }

    #[test]
    fn token_estimate_counts_inline_image() {
        let without = StoredMessage::new(
            MessageBody::UserMultimodal {
                text: "hello".into(),
                image_id: "img-1".into(),
            },
            "t1",
            0,
        );
        let with = without.clone().with_image("QUFBQQ==");
        assert!(with.token_estimate >= without.token_estimate + 1500);
    }

    #[test]
    fn multimodal_renders_data_url_when_inline() {
        let m = StoredMessage::new(
            MessageBody::UserMultimodal {
                text: "look".into(),
                image_id: "img-1".into(),
            },
            "t1",
            0,
        )
        .with_image("QUFBQQ==");
        let wire = m.to_chat_messages();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].image_urls(), vec!["data:image/png;base64,QUFBQQ=="]);
    }

    #[test]
    fn multimodal_renders_placeholder_when_evicted() {
        let m = StoredMessage::new(
            MessageBody::UserMultimodal {
                text: "look".into(),
                image_id: "img-1".into(),
            },
            "t1",
            0,
        );
        let wire = m.to_chat_messages();
        assert!(wire[0]
            .as_text()
            .unwrap()
            .contains("[Visual_Placeholder: img-1]"));
    }

    #[test]
    fn tool_calls_expand_one_wire_message_per_request() {
        let m = StoredMessage::new(
            MessageBody::AssistantToolCalls {
                requests: vec![
                    ToolRequestRecord {
                        id: "a".into(),
                        name: "click".into(),
                        arguments: "{}".into(),
                    },
                    ToolRequestRecord {
                        id: "b".into(),
                        name: "wait".into(),
                        arguments: "{}".into(),
                    },
                ],
            },
            "t1",
            1,
        );
        assert_eq!(m.to_chat_messages().len(), 2);
    }

    #[test]
    fn kind_tags_are_distinct() {
        let kinds = [
            user("x").kind(),
            StoredMessage::new(
                MessageBody::ToolResult {
                    request_id: "a".into(),
                    content: "ok".into(),
                },
                "t",
                0,
            )
            .kind(),
            StoredMessage::new(
                MessageBody::SystemObservation {
                    text: "obs".into(),
                    image_id: None,
                },
                "t",
                0,
            )
            .kind(),
        ];
        assert_eq!(kinds, ["user", "tool_result", "observation"]);
    }
}
