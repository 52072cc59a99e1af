// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChatModel, ChatRequest, ChatResponse, Role, ToolRequest, Usage};

/// Deterministic mock model for tests.  Echoes the last user message back
/// as the assistant response.
#[derive(Default)]
pub struct MockChat;

#[async_trait]
impl ChatModel for MockChat {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();
        Ok(ChatResponse {
            text: Some(format!("MOCK: {reply}")),
            tool_requests: vec![],
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 10,
            }),
        })
    }
}

/// One scripted reply — either a successful response or an error whose
/// message is surfaced through `anyhow`.  Error scripts let tests exercise
/// the quota-retry path (`"429"` / `"RESOURCE_EXHAUSTED"` substrings).
#[derive(Debug, Clone)]
pub enum Script {
    Reply(ChatResponse),
    Fail(String),
}

/// A pre-scripted mock model.  Each call to `generate` pops the next script
/// from the front of the queue, so tests can specify exact sequences —
/// including tool calls and transient failures — without network access.
pub struct ScriptedChat {
    scripts: Mutex<Vec<Script>>,
    /// Every request seen by this provider, in call order.  Tests inspect
    /// this to assert prompt contents (system prompt, skill context, images).
    pub requests: Mutex<Vec<ChatRequest>>,
    supports_images: bool,
}

impl ScriptedChat {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
            supports_images: true,
        }
    }

    /// Convenience: model that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![Script::Reply(ChatResponse::text_only(reply))])
    }

    /// Convenience: model that returns one tool call, then a text reply on
    /// the following call.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            Script::Reply(ChatResponse {
                text: None,
                tool_requests: vec![ToolRequest {
                    id: tool_id.into(),
                    name: tool_name.into(),
                    args,
                }],
                usage: None,
            }),
            Script::Reply(ChatResponse::text_only(final_text)),
        ])
    }

    /// Convenience: model that fails `n` times with `error`, then succeeds
    /// with a text reply.
    pub fn fail_then_text(n: usize, error: impl Into<String>, text: impl Into<String>) -> Self {
        let error = error.into();
        let mut scripts: Vec<Script> = (0..n).map(|_| Script::Fail(error.clone())).collect();
        scripts.push(Script::Reply(ChatResponse::text_only(text)));
        Self::new(scripts)
    }

    /// Number of `generate` calls observed so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Snapshot of the request at `index`, if it was made.
    pub fn request_at(&self, index: usize) -> Option<ChatRequest> {
        self.requests.lock().unwrap().get(index).cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }
    fn supports_images(&self) -> bool {
        self.supports_images
    }

    async fn generate(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                Script::Reply(ChatResponse::text_only("[no more scripts]"))
            } else {
                scripts.remove(0)
            }
        };
        match script {
            Script::Reply(r) => Ok(r),
            Script::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
