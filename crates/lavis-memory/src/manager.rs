// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The seam between the in-memory window, the durable store, and the
//! compactor.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use lavis_config::MemoryConfig;
use lavis_model::{ChatMessage, ChatModel, ChatRequest};

use crate::{
    cold::ColdStorage,
    compactor::VisualCompactor,
    message::{MessageBody, StoredMessage},
    store::{MessageRow, PersistentStore},
    turn::Turn,
    window::ConversationMemory,
};

pub struct MemoryManager {
    window: Mutex<ConversationMemory>,
    store: Arc<PersistentStore>,
    cold: Arc<ColdStorage>,
    compactor: VisualCompactor,
    session_key: Mutex<Option<String>>,
    /// Turn-close compaction gate: at most one compaction at a time per
    /// process.  Contenders enqueue their turn and return without blocking.
    compaction_gate: tokio::sync::Mutex<()>,
    pending_turns: Mutex<Vec<Turn>>,
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(store: Arc<PersistentStore>, cold: Arc<ColdStorage>, config: MemoryConfig) -> Self {
        Self {
            window: Mutex::new(ConversationMemory::new(
                config.window_size,
                config.keep_images,
            )),
            store,
            cold,
            compactor: VisualCompactor::new(&config.exception_patterns),
            session_key: Mutex::new(None),
            compaction_gate: tokio::sync::Mutex::new(()),
            pending_turns: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn cold(&self) -> &Arc<ColdStorage> {
        &self.cold
    }

    /// The current session key, creating the session row on first use.
    pub fn current_session_key(&self) -> String {
        let mut slot = self.session_key.lock().unwrap();
        if let Some(key) = slot.as_ref() {
            return key.clone();
        }
        let key = Uuid::new_v4().to_string();
        if let Err(e) = self.store.ensure_session(&key) {
            warn!(error = %e, "session row creation failed; continuing in-memory");
        }
        info!(session = %key, "session started");
        *slot = Some(key.clone());
        key
    }

    /// Clear the window and allocate a fresh session key.  Prior rows stay
    /// in the store.
    pub fn reset_session(&self) -> String {
        self.window.lock().unwrap().clear();
        *self.session_key.lock().unwrap() = None;
        self.current_session_key()
    }

    /// Persist a message (best-effort) and append it to the window.
    pub fn save_message(&self, msg: StoredMessage) {
        let session = self.current_session_key();
        if let Err(e) = self.store.record_message(&session, &msg) {
            warn!(error = %e, "message persistence failed; session stats may drift");
        }
        self.window.lock().unwrap().append(msg);
    }

    /// Snapshot of the window for prompt assembly.
    pub fn snapshot(&self) -> Vec<StoredMessage> {
        self.window.lock().unwrap().snapshot()
    }

    /// Snapshot rendered to wire messages.
    pub fn snapshot_chat_messages(&self) -> Vec<ChatMessage> {
        self.snapshot()
            .iter()
            .flat_map(|m| m.to_chat_messages())
            .collect()
    }

    pub fn window_len(&self) -> usize {
        self.window.lock().unwrap().len()
    }

    pub fn window_tokens(&self) -> usize {
        self.window.lock().unwrap().token_estimate()
    }

    /// Turn-close hook.  Serialized by a try-lock: the losing contender
    /// enqueues its turn for the current holder (or the next caller) to
    /// drain, and never blocks the loop's return.
    pub fn on_turn_end(&self, turn: Turn) {
        self.pending_turns.lock().unwrap().push(turn);
        let Ok(_guard) = self.compaction_gate.try_lock() else {
            debug!("compaction already running; turn queued");
            return;
        };
        loop {
            let Some(next) = self.pending_turns.lock().unwrap().pop() else {
                break;
            };
            let outcome = {
                let mut window = self.window.lock().unwrap();
                self.compactor.compact_turn(&next, &mut window, &self.cold)
            };
            if !outcome.archived.is_empty() {
                if let Err(e) = self.store.mark_compressed(&next.id, &outcome.archived) {
                    warn!(error = %e, turn = %next.id, "marking compressed rows failed");
                }
            }
        }
    }

    /// Periodic maintenance: window-level image eviction plus summary
    /// compression once the window's token estimate crosses the threshold.
    /// Returns `(images_cleaned, compression_performed)`.
    pub async fn manage_memory(&self, model: &Arc<dyn ChatModel>) -> (usize, bool) {
        let images_cleaned = self.window.lock().unwrap().evict_image_payloads();

        let (tokens, len) = {
            let window = self.window.lock().unwrap();
            (window.token_estimate(), window.len())
        };
        if tokens <= self.config.summary_token_threshold || len < 4 {
            return (images_cleaned, false);
        }

        // Summarize the older half.  The window lock is not held across the
        // model call; the head is re-clamped at every use since concurrent
        // units of work may have moved it.
        let head_count = len / 2;
        let transcript = {
            let window = self.window.lock().unwrap();
            let snap = window.snapshot();
            let n = head_count.min(snap.len());
            render_transcript(&snap[..n])
        };

        let req = ChatRequest {
            messages: vec![
                ChatMessage::system(
                    "You condense conversation history. Summarize the transcript into a \
                     compact brief preserving goals, decisions, tool outcomes, and any \
                     unresolved problems. Output only the summary.",
                ),
                ChatMessage::user(transcript),
            ],
            tools: vec![],
        };
        match model.generate(req).await {
            Ok(resp) => {
                let Some(summary) = resp.text.filter(|t| !t.is_empty()) else {
                    warn!("summary compression returned no text; keeping history");
                    return (images_cleaned, false);
                };
                let mut window = self.window.lock().unwrap();
                let turn_id = window
                    .snapshot()
                    .first()
                    .map(|m| m.turn_id.clone())
                    .unwrap_or_else(|| "summary".into());
                let replacement = StoredMessage::new(
                    MessageBody::SystemObservation {
                        text: format!("Summary of earlier conversation:\n{summary}"),
                        image_id: None,
                    },
                    turn_id,
                    0,
                );
                let replace_count = head_count.min(window.len());
                window.replace_head(replace_count, replacement);
                info!(
                    tokens_before = tokens,
                    tokens_after = window.token_estimate(),
                    "summary compression applied"
                );
                (images_cleaned, true)
            }
            Err(e) => {
                warn!(error = %e, "summary compression model call failed");
                (images_cleaned, false)
            }
        }
    }

    /// Resolve image bytes: the cold archive is the only durable holder.
    pub fn resolve_image(&self, image_id: &str) -> Option<Vec<u8>> {
        self.cold.retrieve(image_id)
    }

    pub fn history(&self, limit: usize) -> anyhow::Result<Vec<MessageRow>> {
        let session = self.current_session_key();
        self.store.history(&session, limit)
    }

    pub fn clear_history(&self) -> anyhow::Result<usize> {
        let session = self.current_session_key();
        self.window.lock().unwrap().clear();
        self.store.clear_history(&session)
    }

    /// Spawn the cold-storage retention task (one pass per day).
    pub fn spawn_cold_cleanup_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self;
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let pruned = manager.cold.cleanup(manager.config.cold_retention_days);
                if pruned > 0 {
                    info!(pruned, "cold storage retention pass");
                }
            }
        })
    }
}

fn render_transcript(messages: &[StoredMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        let text = msg.text_content();
        if text.is_empty() {
            continue;
        }
        out.push_str(&format!("[{}] {}\n", msg.kind(), text));
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
