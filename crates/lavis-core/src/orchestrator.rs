// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The reasoning loop: one "chat with screenshot" request, iterated tool
//! calls until the model stops asking for them, invokes the terminator, or
//! the step cap is reached.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use lavis_config::AgentConfig;
use lavis_model::{ChatMessage, ChatModel, ChatRequest, ChatResponse, ToolSchema};
use lavis_perception::{CaptureOptions, DedupCapturer};
use lavis_skills::SkillService;
use lavis_memory::{MemoryManager, MessageBody, StoredMessage, ToolRequestRecord, TurnContext};
use lavis_tools::{
    GoalRunner, ToolCall, ToolRegistry, FAILURE_MARKER, TERMINATOR_MARKER, TERMINATOR_NAME,
};

use crate::prompts;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_ERROR: u8 = 2;

/// A resolved frame ready to be bound into a message.
struct Frame {
    image_id: String,
    base64: Option<String>,
}

pub struct Orchestrator {
    model: Option<Arc<dyn ChatModel>>,
    tools: Arc<ToolRegistry>,
    capturer: Arc<DedupCapturer>,
    memory: Arc<MemoryManager>,
    skills: Arc<SkillService>,
    config: AgentConfig,
    state: AtomicU8,
    /// Cancel sender for the in-flight unit of work, if any.
    active_cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl Orchestrator {
    pub fn new(
        model: Option<Arc<dyn ChatModel>>,
        tools: Arc<ToolRegistry>,
        capturer: Arc<DedupCapturer>,
        memory: Arc<MemoryManager>,
        skills: Arc<SkillService>,
        config: AgentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            model,
            tools,
            capturer,
            memory,
            skills,
            config,
            state: AtomicU8::new(STATE_IDLE),
            active_cancel: Mutex::new(None),
        })
    }

    pub fn available(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> Option<String> {
        self.model.as_ref().map(|m| m.model_name().to_string())
    }

    pub fn state(&self) -> &'static str {
        match self.state.load(Ordering::Relaxed) {
            STATE_RUNNING => "running",
            STATE_ERROR => "error",
            _ => "idle",
        }
    }

    /// Signal cancellation to the in-flight unit of work, if any.
    pub fn stop(&self) -> bool {
        match self.active_cancel.lock().unwrap().as_ref() {
            Some(tx) => {
                info!("stop requested");
                tx.send(true).is_ok()
            }
            None => false,
        }
    }

    /// Chat entry point — step-capped per configuration.
    pub async fn chat(&self, text: &str) -> String {
        let cap = match self.config.max_steps {
            0 => None,
            n => Some(n),
        };
        self.run(text, cap).await
    }

    /// Task entry point — no step cap.
    pub async fn run_task(&self, goal: &str) -> String {
        self.run(goal, None).await
    }

    /// Periodic maintenance hook: window image eviction + summary
    /// compression.
    pub async fn maintain(&self) -> (usize, bool) {
        match &self.model {
            Some(model) => self.memory.manage_memory(model).await,
            None => (0, false),
        }
    }

    async fn run(&self, text: &str, cap: Option<u32>) -> String {
        let Some(model) = self.model.clone() else {
            return format!(
                "{FAILURE_MARKER}No chat model is configured. Set an API key \
                 (e.g. OPENAI_API_KEY) or configure model.provider, then try again."
            );
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.active_cancel.lock().unwrap() = Some(cancel_tx);
        self.state.store(STATE_RUNNING, Ordering::Relaxed);

        // The turn context is scoped to this unit of work; two concurrent
        // requests never observe each other's turn.
        let ctx = TurnContext::new();
        let session = self.memory.current_session_key();
        ctx.begin(&session);

        let result = self.run_loop(&model, &ctx, text, cap, cancel_rx).await;

        // end() pairs with the begin above on every path, including errors.
        if let Some(turn) = ctx.end() {
            self.memory.on_turn_end(turn);
        }
        *self.active_cancel.lock().unwrap() = None;

        match result {
            Ok(response) => {
                self.state.store(STATE_IDLE, Ordering::Relaxed);
                response
            }
            Err(e) => {
                self.state.store(STATE_ERROR, Ordering::Relaxed);
                warn!(error = %e, "reasoning invocation failed terminally");
                format!("{FAILURE_MARKER}{e}")
            }
        }
    }

    async fn run_loop(
        &self,
        model: &Arc<dyn ChatModel>,
        ctx: &TurnContext,
        user_text: &str,
        cap: Option<u32>,
        mut cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<String> {
        let turn_id = ctx
            .current()
            .map(|t| t.id)
            .unwrap_or_else(|| "detached".into());
        let mut turn_pos: u32 = 0;

        // Initial perception.  A failed first capture degrades to a
        // text-only user message rather than aborting the request.
        let initial = self.capture_frame(CaptureOptions::default()).await;
        let user_msg = match &initial {
            Some(frame) => {
                ctx.record_image(&frame.image_id);
                let msg = StoredMessage::new(
                    MessageBody::UserMultimodal {
                        text: user_text.to_string(),
                        image_id: frame.image_id.clone(),
                    },
                    &turn_id,
                    turn_pos,
                );
                match &frame.base64 {
                    Some(b64) => msg.with_image(b64.clone()),
                    None => msg,
                }
            }
            None => StoredMessage::new(
                MessageBody::UserText {
                    text: user_text.to_string(),
                },
                &turn_id,
                turn_pos,
            ),
        };
        turn_pos += 1;
        self.memory.save_message(user_msg);

        // Prompt assembly: system (with any enclosing skill's knowledge),
        // then the window snapshot, which already ends with the user message
        // just saved.
        let skill_ctx = self.skills.current_context();
        let mut messages: Vec<ChatMessage> =
            vec![ChatMessage::system(prompts::system_prompt(skill_ctx.as_ref()))];
        messages.extend(self.memory.snapshot_chat_messages());

        let tools: Vec<ToolSchema> = self
            .tools
            .specifications()
            .into_iter()
            .map(|s| ToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        let mut steps = 0u32;
        let mut response_parts: Vec<String> = Vec::new();
        let mut all_summaries: Vec<String> = Vec::new();

        loop {
            steps += 1;

            let Some(reply) = self
                .generate_with_retry(model, &messages, &tools, &mut cancel)
                .await?
            else {
                return Ok(stopped_response(&response_parts, &all_summaries));
            };

            if let Some(text) = reply.text.as_deref().filter(|t| !t.is_empty()) {
                response_parts.push(text.to_string());
                messages.push(ChatMessage::assistant(text));
                self.memory.save_message(StoredMessage::new(
                    MessageBody::AssistantText { text: text.into() },
                    &turn_id,
                    turn_pos,
                ));
                turn_pos += 1;
            }

            if reply.tool_requests.is_empty() {
                return Ok(final_response(&response_parts, &all_summaries));
            }

            let records: Vec<ToolRequestRecord> = reply
                .tool_requests
                .iter()
                .map(|r| ToolRequestRecord {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    arguments: r.args.to_string(),
                })
                .collect();
            for rec in &records {
                messages.push(ChatMessage::tool_call(&rec.id, &rec.name, &rec.arguments));
            }
            self.memory.save_message(StoredMessage::new(
                MessageBody::AssistantToolCalls { requests: records },
                &turn_id,
                turn_pos,
            ));
            turn_pos += 1;

            // Dispatch in request order.  Tool failures come back as
            // strings and never propagate.
            let mut any_visual = false;
            let mut saw_terminator = false;
            let mut max_wait = Duration::ZERO;
            let mut executed: Vec<String> = Vec::new();
            let mut round_summaries: Vec<String> = Vec::new();
            let mut cancelled = false;

            for req in &reply.tool_requests {
                if cancelled || *cancel.borrow() {
                    // Every request id still gets a result so the prompt
                    // never carries a dangling tool call.
                    cancelled = true;
                    self.push_tool_result(&mut messages, &turn_id, &mut turn_pos, &req.id, "cancelled");
                    continue;
                }
                let call = ToolCall {
                    id: req.id.clone(),
                    name: req.name.clone(),
                    args: req.args.clone(),
                };
                let output = self.tools.execute(&call).await;
                debug!(tool = %req.name, is_error = output.is_error, "tool dispatched");
                round_summaries.push(format!("{}: {}", req.name, clip(&output.content, 400)));
                executed.push(req.name.clone());

                if req.name == TERMINATOR_NAME && output.content.contains(TERMINATOR_MARKER) {
                    saw_terminator = true;
                }
                if self.tools.is_visual_impact(&req.name) {
                    any_visual = true;
                    if let Some(w) = self.tools.post_action_wait(&req.name) {
                        max_wait = max_wait.max(w);
                    }
                }
                self.push_tool_result(
                    &mut messages,
                    &turn_id,
                    &mut turn_pos,
                    &req.id,
                    &output.content,
                );
            }
            all_summaries.extend(round_summaries.iter().cloned());

            if cancelled {
                return Ok(stopped_response(&response_parts, &all_summaries));
            }
            if saw_terminator {
                return Ok(final_response(&response_parts, &all_summaries));
            }

            if any_visual {
                // The screen changed: settle for the longest per-tool wait,
                // then observe with a forced, non-deduplicated capture.
                tokio::select! {
                    biased;
                    _ = cancel.changed() => {
                        return Ok(stopped_response(&response_parts, &all_summaries));
                    }
                    _ = tokio::time::sleep(max_wait) => {}
                }

                let frame = match self
                    .capture_frame(CaptureOptions {
                        force: true,
                        skip_dedup: true,
                    })
                    .await
                {
                    Some(f) => Some(f),
                    None => {
                        self.capturer.clear_cache();
                        self.capture_frame(CaptureOptions {
                            force: true,
                            skip_dedup: true,
                        })
                        .await
                    }
                };

                let observation = match frame {
                    Some(frame) => {
                        ctx.record_image(&frame.image_id);
                        let msg = StoredMessage::new(
                            MessageBody::SystemObservation {
                                text: observation_text(&executed, &round_summaries),
                                image_id: Some(frame.image_id.clone()),
                            },
                            &turn_id,
                            turn_pos,
                        );
                        match &frame.base64 {
                            Some(b64) => msg.with_image(b64.clone()),
                            None => msg,
                        }
                    }
                    None => StoredMessage::new(
                        MessageBody::SystemObservation {
                            text: format!(
                                "Screenshot capture failed after a retry; the current \
                                 screen state is unknown.\nTool results so far:\n{}\n\
                                 Continue from the last known state and consider \
                                 capture_screen again later.",
                                round_summaries.join("\n")
                            ),
                            image_id: None,
                        },
                        &turn_id,
                        turn_pos,
                    ),
                };
                turn_pos += 1;
                messages.extend(observation.to_chat_messages());
                self.memory.save_message(observation);
            }

            if let Some(limit) = cap {
                if steps >= limit {
                    let mut out = final_response(&response_parts, &all_summaries);
                    out.push_str("\n[max iterations reached]");
                    return Ok(out);
                }
            }
        }
    }

    fn push_tool_result(
        &self,
        messages: &mut Vec<ChatMessage>,
        turn_id: &str,
        turn_pos: &mut u32,
        request_id: &str,
        content: &str,
    ) {
        messages.push(ChatMessage::tool_result(request_id, content));
        self.memory.save_message(StoredMessage::new(
            MessageBody::ToolResult {
                request_id: request_id.to_string(),
                content: content.to_string(),
            },
            turn_id,
            *turn_pos,
        ));
        *turn_pos += 1;
    }

    /// Capture a frame, resolving a deduplicated reuse to the cached bytes.
    /// When the cache has vanished under a reuse, forces one recapture.
    /// Returns `None` when no frame can be produced at all.
    async fn capture_frame(&self, options: CaptureOptions) -> Option<Frame> {
        match self.capturer.capture(options).await {
            Ok(captured) => {
                if let Some(b64) = captured.base64 {
                    return Some(Frame {
                        image_id: captured.image_id,
                        base64: Some(b64),
                    });
                }
                if let Some(b64) = self.capturer.last_base64() {
                    return Some(Frame {
                        image_id: captured.image_id,
                        base64: Some(b64),
                    });
                }
                // Reused but the cache is gone — one forced recapture.
                match self
                    .capturer
                    .capture(CaptureOptions {
                        force: true,
                        skip_dedup: true,
                    })
                    .await
                {
                    Ok(fresh) => Some(Frame {
                        image_id: fresh.image_id,
                        base64: fresh.base64,
                    }),
                    Err(e) => {
                        warn!(error = %e, "forced recapture failed");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "screen capture failed");
                None
            }
        }
    }

    /// One model call under the retry policy: quota failures back off with
    /// doubling delays, other transient failures wait the base delay, and
    /// the budget is shared.  `Ok(None)` means the unit of work was
    /// cancelled.
    async fn generate_with_retry(
        &self,
        model: &Arc<dyn ChatModel>,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        cancel: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<Option<ChatResponse>> {
        let attempts = self.config.retry_attempts.max(1);
        let base = Duration::from_millis(self.config.retry_base_delay_ms);
        let mut attempt = 0u32;
        loop {
            if *cancel.borrow() {
                return Ok(None);
            }
            let req = ChatRequest {
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.changed() => return Ok(None),
                r = model.generate(req) => r,
            };
            match outcome {
                Ok(reply) => return Ok(Some(reply)),
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(e.context("model call failed after retries"));
                    }
                    let delay = if is_quota_error(&e) {
                        base * 2u32.pow(attempt - 1)
                    } else {
                        base
                    };
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "model call failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.changed() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl GoalRunner for Orchestrator {
    async fn run_goal(&self, goal: &str) -> anyhow::Result<String> {
        let response = self.run(goal, None).await;
        if response.starts_with(FAILURE_MARKER) {
            anyhow::bail!("{response}");
        }
        Ok(response)
    }
}

/// Classify a provider failure as quota/rate-limit by payload substring.
fn is_quota_error(e: &anyhow::Error) -> bool {
    let msg = e.to_string();
    msg.contains("429") || msg.contains("RESOURCE_EXHAUSTED")
}

fn observation_text(executed: &[String], round_summaries: &[String]) -> String {
    format!(
        "Screen observed after executing: {}.\nTool results:\n{}\n\n\
         Check your history before the next action: if an identical call with \
         identical arguments has already been tried twice without reaching the \
         goal, choose a different approach instead of repeating it.",
        executed.join(", "),
        round_summaries.join("\n")
    )
}

/// The model's final text, or an accumulated tool-result summary when the
/// model produced tool calls but never a closing text.
fn final_response(parts: &[String], summaries: &[String]) -> String {
    let text = parts.join("\n").trim().to_string();
    if !text.is_empty() {
        return text;
    }
    if !summaries.is_empty() {
        return format!("Completed with tool activity:\n{}", summaries.join("\n"));
    }
    "(no response)".to_string()
}

fn stopped_response(parts: &[String], summaries: &[String]) -> String {
    let base = final_response(parts, summaries);
    if base == "(no response)" {
        "Stopped.".to_string()
    } else {
        format!("{base}\n[stopped]")
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let clipped: String = s.chars().take(max_chars).collect();
    format!("{clipped}…")
}
