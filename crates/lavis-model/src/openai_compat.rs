// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Reference chat driver speaking the OpenAI `/chat/completions` wire format.
//!
//! One driver covers every OpenAI-compatible endpoint (hosted or local
//! gateway) — the base URL and model name come from configuration.  The
//! driver is non-streaming: the reasoning loop consumes whole responses.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    ChatContent, ChatMessage, ChatModel, ChatRequest, ChatResponse, ContentPart, Role,
    ToolRequest, Usage,
};

pub struct OpenAiCompatChat {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAiCompatChat {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        let base = base_url.unwrap_or_else(|| "https://api.openai.com/v1".into());
        Self {
            model: model.into(),
            api_key,
            chat_url: format!("{}/chat/completions", base.trim_end_matches('/')),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    /// Render the history onto the wire.
    ///
    /// Consecutive `ToolCall` messages are merged into one assistant message
    /// with a multi-element `tool_calls` array — the endpoint rejects a
    /// second assistant tool-call message arriving before the first call's
    /// `tool` result, so parallel calls must travel together.
    fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::with_capacity(messages.len());
        let mut i = 0;

        while i < messages.len() {
            if let ChatContent::ToolCall {
                tool_call_id,
                function,
            } = &messages[i].content
            {
                let mut calls = vec![tool_call_to_json(tool_call_id, function)];
                i += 1;
                while i < messages.len() {
                    if let ChatContent::ToolCall {
                        tool_call_id,
                        function,
                    } = &messages[i].content
                    {
                        calls.push(tool_call_to_json(tool_call_id, function));
                        i += 1;
                    } else {
                        break;
                    }
                }
                result.push(json!({ "role": "assistant", "tool_calls": calls }));
                continue;
            }

            result.push(wire_message(&messages[i]));
            i += 1;
        }
        result
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
    json!({
        "id": tool_call_id,
        "type": "function",
        "function": { "name": function.name, "arguments": function.arguments },
    })
}

/// Wire form of one non-tool-call message.  Tool-call runs are handled by
/// `wire_messages`, which merges them.
fn wire_message(m: &ChatMessage) -> Value {
    match &m.content {
        ChatContent::Text(t) => json!({ "role": role_str(m.role), "content": t }),
        ChatContent::Parts(parts) => {
            let wire_parts: Vec<Value> = parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::Image { image_url } => {
                        json!({ "type": "image_url", "image_url": { "url": image_url } })
                    }
                })
                .collect();
            json!({ "role": role_str(m.role), "content": wire_parts })
        }
        ChatContent::ToolCall {
            tool_call_id,
            function,
        } => json!({
            "role": "assistant",
            "tool_calls": [tool_call_to_json(tool_call_id, function)],
        }),
        ChatContent::ToolResult {
            tool_call_id,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
    }
}

/// Parse the arguments string of one wire tool call into a JSON object.
/// Empty or invalid arguments resolve to `{}` — the tool layer reports the
/// missing parameters back to the model as a normal failure string.
fn parse_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        debug!(error = %e, "tool call arguments were not valid JSON; substituting {{}}");
        Value::Object(Default::default())
    })
}

#[async_trait]
impl ChatModel for OpenAiCompatChat {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::wire_messages(&req.messages),
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(mt) = self.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }

        let mut request = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("chat request failed")?;
        let status = response.status();
        let payload = response.text().await.context("reading chat response")?;
        if !status.is_success() {
            // The status code stays in the message so the loop's quota
            // classifier ("429" substring) can see it.
            anyhow::bail!("chat completion failed with status {status}: {payload}");
        }

        let parsed: Value =
            serde_json::from_str(&payload).context("parsing chat completion JSON")?;
        let message = &parsed["choices"][0]["message"];

        let text = message["content"]
            .as_str()
            .map(str::to_string)
            .filter(|t| !t.is_empty());

        let tool_requests: Vec<ToolRequest> = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|tc| {
                        let name = tc["function"]["name"].as_str()?.to_string();
                        let id = tc["id"].as_str().unwrap_or_default().to_string();
                        let args = parse_args(tc["function"]["arguments"].as_str().unwrap_or(""));
                        Some(ToolRequest { id, name, args })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = parsed.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(ChatResponse {
            text,
            tool_requests,
            usage,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_text_message_has_role_and_content() {
        let v = wire_message(&ChatMessage::user("hello"));
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hello");
    }

    #[test]
    fn wire_tool_call_message_carries_function() {
        let v = wire_message(&ChatMessage::tool_call("tc1", "click", r#"{"x":1}"#));
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["tool_calls"][0]["id"], "tc1");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "click");
    }

    #[test]
    fn consecutive_tool_calls_merge_into_one_assistant_message() {
        let history = vec![
            ChatMessage::user("go"),
            ChatMessage::tool_call("tc1", "click", r#"{"coordinate":[1,2]}"#),
            ChatMessage::tool_call("tc2", "wait", r#"{"duration_ms":500}"#),
            ChatMessage::tool_result("tc1", "clicked"),
            ChatMessage::tool_result("tc2", "waited"),
        ];
        let wire = OpenAiCompatChat::wire_messages(&history);

        // user, ONE merged assistant message, then the two tool results.
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["role"], "assistant");
        let calls = wire[1]["tool_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["id"], "tc1");
        assert_eq!(calls[0]["function"]["name"], "click");
        assert_eq!(calls[1]["id"], "tc2");
        assert_eq!(calls[1]["function"]["name"], "wait");
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "tc1");
        assert_eq!(wire[3]["tool_call_id"], "tc2");
    }

    #[test]
    fn tool_call_runs_split_by_other_messages_stay_separate() {
        let history = vec![
            ChatMessage::tool_call("tc1", "click", "{}"),
            ChatMessage::tool_result("tc1", "ok"),
            ChatMessage::tool_call("tc2", "scroll", "{}"),
            ChatMessage::tool_result("tc2", "ok"),
        ];
        let wire = OpenAiCompatChat::wire_messages(&history);
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["tool_calls"].as_array().unwrap().len(), 1);
        assert_eq!(wire[2]["tool_calls"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn wire_tool_result_message_cites_call_id() {
        let v = wire_message(&ChatMessage::tool_result("tc1", "ok"));
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "tc1");
        assert_eq!(v["content"], "ok");
    }

    #[test]
    fn wire_multimodal_message_uses_image_url_parts() {
        let m = ChatMessage::user_with_parts(vec![
            ContentPart::text("look"),
            ContentPart::image("data:image/png;base64,AAAA"),
        ]);
        let v = wire_message(&m);
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image_url");
        assert_eq!(
            v["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn parse_args_empty_is_object() {
        assert_eq!(parse_args(""), serde_json::json!({}));
    }

    #[test]
    fn parse_args_invalid_json_is_object() {
        assert_eq!(parse_args("{not json"), serde_json::json!({}));
    }

    #[test]
    fn parse_args_valid_json_passes_through() {
        assert_eq!(
            parse_args(r#"{"coordinate":[1,2]}"#),
            serde_json::json!({"coordinate": [1, 2]})
        );
    }

    #[test]
    fn chat_url_trims_trailing_slash() {
        let p = OpenAiCompatChat::new("m", None, Some("http://x/v1/".into()), None, None);
        assert_eq!(p.chat_url, "http://x/v1/chat/completions");
    }
}
