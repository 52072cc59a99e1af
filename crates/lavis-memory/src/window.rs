// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The bounded, time-ordered message window used for prompt assembly.
//!
//! Two eviction mechanisms keep it bounded:
//! - **Message eviction** on overflow, in cohesion-preserving groups — a
//!   tool-result is never separated from its originating tool-call request,
//!   and an entire earliest turn is preferred over splitting one.
//! - **Image-payload eviction** once more than `keep_images` messages hold
//!   inline bytes: the oldest non-anchor payloads are replaced by the
//!   `[Visual_Placeholder: <id>]` reference, the id staying valid for cold
//!   resolution.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::message::{MessageBody, StoredMessage};

pub struct ConversationMemory {
    messages: VecDeque<StoredMessage>,
    max_messages: usize,
    keep_images: usize,
    /// turn id → ordered image ids observed in this window.  The first and
    /// last entries are the turn's anchors; anchors never lose their payload
    /// to window eviction.
    turn_images: HashMap<String, Vec<String>>,
}

impl ConversationMemory {
    pub fn new(max_messages: usize, keep_images: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_messages: max_messages.max(2),
            keep_images,
            turn_images: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total token estimate across the window.
    pub fn token_estimate(&self) -> usize {
        self.messages.iter().map(|m| m.token_estimate).sum()
    }

    /// Append a message, then enforce both bounds.
    pub fn append(&mut self, msg: StoredMessage) {
        if let Some(image_id) = msg.image_id() {
            let images = self.turn_images.entry(msg.turn_id.clone()).or_default();
            if images.last().map(String::as_str) != Some(image_id) {
                images.push(image_id.to_string());
            }
        }
        self.messages.push_back(msg);
        self.evict_overflow();
        self.evict_image_payloads();
    }

    /// Snapshot for prompt assembly (copy-on-read; the lock around this
    /// structure is never held across a model call).
    pub fn snapshot(&self) -> Vec<StoredMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.turn_images.clear();
    }

    /// Mutable walk, used by the compactor on turn close.
    pub fn messages_mut(&mut self) -> impl Iterator<Item = &mut StoredMessage> {
        self.messages.iter_mut()
    }

    /// Replace the leading `count` messages with `replacement` (summary
    /// compression).  Counts are clamped to the window length.
    pub fn replace_head(&mut self, count: usize, replacement: StoredMessage) {
        let count = count.min(self.messages.len());
        for _ in 0..count {
            if let Some(removed) = self.messages.pop_front() {
                self.forget_turn_images_if_gone(&removed);
            }
        }
        self.messages.push_front(replacement);
    }

    // ── Message eviction ──────────────────────────────────────────────────────

    fn evict_overflow(&mut self) {
        while self.messages.len() > self.max_messages {
            let group = self.front_eviction_group();
            if group == 0 || group >= self.messages.len() {
                warn!(
                    len = self.messages.len(),
                    max = self.max_messages,
                    "window bound violated: eviction would orphan a tool result \
                     or empty the window"
                );
                break;
            }
            for _ in 0..group {
                if let Some(removed) = self.messages.pop_front() {
                    self.forget_turn_images_if_gone(&removed);
                }
            }
        }
    }

    /// Size of the cohesive group at the front of the deque.
    ///
    /// Prefer the entire earliest turn when more than one turn is present.
    /// Within a single remaining turn, fall back to pairwise groups:
    /// user + following assistant reply, or assistant tool-calls + all of
    /// their results.  Returns 0 when no eviction can preserve cohesion.
    fn front_eviction_group(&self) -> usize {
        let Some(front) = self.messages.front() else {
            return 0;
        };
        let front_turn = &front.turn_id;
        let turn_len = self
            .messages
            .iter()
            .take_while(|m| &m.turn_id == front_turn)
            .count();
        if turn_len < self.messages.len() {
            return turn_len;
        }

        // Only one turn left — evict pairwise from its front.
        match &front.body {
            MessageBody::AssistantToolCalls { requests } => {
                let results = self
                    .messages
                    .iter()
                    .skip(1)
                    .take_while(|m| matches!(m.body, MessageBody::ToolResult { .. }))
                    .count();
                if results < requests.len() {
                    // Results still pending; evicting now would orphan them
                    // when they arrive.
                    0
                } else {
                    1 + results
                }
            }
            MessageBody::UserText { .. } | MessageBody::UserMultimodal { .. } => {
                let paired = matches!(
                    self.messages.get(1).map(|m| &m.body),
                    Some(MessageBody::AssistantText { .. })
                );
                if paired {
                    2
                } else {
                    1
                }
            }
            // A leading orphan result is already incoherent; drop it.
            MessageBody::ToolResult { .. } => 1,
            MessageBody::AssistantText { .. } | MessageBody::SystemObservation { .. } => 1,
        }
    }

    fn forget_turn_images_if_gone(&mut self, removed: &StoredMessage) {
        let still_present = self.messages.iter().any(|m| m.turn_id == removed.turn_id);
        if !still_present {
            self.turn_images.remove(&removed.turn_id);
        }
    }

    // ── Image-payload eviction ────────────────────────────────────────────────

    /// Drop the oldest inline payloads until at most `keep_images` messages
    /// hold bytes.  Non-anchor images go first; anchors of older turns are
    /// sacrificed only when that is not enough.  Anchors of the newest turn
    /// in the window never yield — if only those remain, the bound is
    /// violated and a warning surfaced.  Returns how many payloads were
    /// evicted.
    pub fn evict_image_payloads(&mut self) -> usize {
        let mut evicted = 0;
        loop {
            let inline = self
                .messages
                .iter()
                .filter(|m| m.image_base64.is_some())
                .count();
            if inline <= self.keep_images {
                break;
            }
            let newest_turn = self.messages.back().map(|m| m.turn_id.clone());
            let non_anchor = self
                .messages
                .iter()
                .position(|m| m.image_base64.is_some() && !is_anchor(&self.turn_images, m));
            let victim = non_anchor.or_else(|| {
                // Second resort: oldest anchor outside the active turn.
                self.messages.iter().position(|m| {
                    m.image_base64.is_some() && Some(&m.turn_id) != newest_turn.as_ref()
                })
            });
            match victim {
                Some(i) => {
                    self.messages[i].image_base64 = None;
                    self.messages[i].token_estimate = self.messages[i].estimate_tokens();
                    evicted += 1;
                }
                None => {
                    warn!(
                        inline,
                        keep = self.keep_images,
                        "image bound violated: only the active turn's anchors remain inline"
                    );
                    break;
                }
            }
        }
        evicted
    }

    /// Anchor ids (first and last recorded image) for a turn in this window.
    pub fn anchors_of(&self, turn_id: &str) -> Option<(String, String)> {
        let images = self.turn_images.get(turn_id)?;
        Some((images.first()?.clone(), images.last()?.clone()))
    }
}

fn is_anchor(turn_images: &HashMap<String, Vec<String>>, msg: &StoredMessage) -> bool {
    let Some(image_id) = msg.image_id() else {
        return false;
    };
    let Some(images) = turn_images.get(&msg.turn_id) else {
        return false;
    };
    images.first().map(String::as_str) == Some(image_id)
        || images.last().map(String::as_str) == Some(image_id)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolRequestRecord;

    fn user(turn: &str, pos: u32, text: &str) -> StoredMessage {
        StoredMessage::new(MessageBody::UserText { text: text.into() }, turn, pos)
    }

    fn assistant(turn: &str, pos: u32, text: &str) -> StoredMessage {
        StoredMessage::new(MessageBody::AssistantText { text: text.into() }, turn, pos)
    }

    fn tool_calls(turn: &str, pos: u32, ids: &[&str]) -> StoredMessage {
        StoredMessage::new(
            MessageBody::AssistantToolCalls {
                requests: ids
                    .iter()
                    .map(|id| ToolRequestRecord {
                        id: id.to_string(),
                        name: "click".into(),
                        arguments: "{}".into(),
                    })
                    .collect(),
            },
            turn,
            pos,
        )
    }

    fn tool_result(turn: &str, pos: u32, request_id: &str) -> StoredMessage {
        StoredMessage::new(
            MessageBody::ToolResult {
                request_id: request_id.into(),
                content: "ok".into(),
            },
            turn,
            pos,
        )
    }

    fn image_msg(turn: &str, pos: u32, image_id: &str) -> StoredMessage {
        StoredMessage::new(
            MessageBody::UserMultimodal {
                text: "frame".into(),
                image_id: image_id.into(),
            },
            turn,
            pos,
        )
        .with_image("QUFBQQ==")
    }

    #[test]
    fn append_preserves_order() {
        let mut w = ConversationMemory::new(10, 10);
        w.append(user("t1", 0, "a"));
        w.append(assistant("t1", 1, "b"));
        let snap = w.snapshot();
        assert_eq!(snap[0].text_content(), "a");
        assert_eq!(snap[1].text_content(), "b");
    }

    #[test]
    fn overflow_evicts_whole_earliest_turn() {
        let mut w = ConversationMemory::new(4, 10);
        w.append(user("t1", 0, "q1"));
        w.append(assistant("t1", 1, "a1"));
        w.append(user("t2", 0, "q2"));
        w.append(assistant("t2", 1, "a2"));
        w.append(user("t3", 0, "q3"));
        // t1 evicted entirely; t2 + t3 remain.
        let snap = w.snapshot();
        assert!(snap.iter().all(|m| m.turn_id != "t1"));
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn tool_results_never_orphaned_by_eviction() {
        let mut w = ConversationMemory::new(4, 10);
        // One single oversized turn: user, tool-calls, results, observation…
        w.append(user("t1", 0, "go"));
        w.append(tool_calls("t1", 1, &["c1"]));
        w.append(tool_result("t1", 2, "c1"));
        w.append(assistant("t1", 3, "done"));
        w.append(user("t1", 4, "more"));
        // Eviction within the single turn drops the leading user first, then
        // the tool-call group as a unit; at no point does a result survive
        // its request.
        let snap = w.snapshot();
        let has_result = snap
            .iter()
            .any(|m| matches!(m.body, MessageBody::ToolResult { .. }));
        let has_call = snap
            .iter()
            .any(|m| matches!(m.body, MessageBody::AssistantToolCalls { .. }));
        assert_eq!(has_result, has_call, "result must coexist with its call");
        assert!(w.len() <= 4);
    }

    #[test]
    fn pending_tool_results_block_eviction_with_warning() {
        let mut w = ConversationMemory::new(2, 10);
        // The tool-call's results have not arrived yet; the window cannot
        // evict the front group without orphaning them later.
        w.append(tool_calls("t1", 0, &["c1", "c2"]));
        w.append(tool_result("t1", 1, "c1"));
        w.append(user("t1", 2, "x"));
        // Bound is violated rather than split the group.
        assert!(w.len() > 2);
    }

    #[test]
    fn image_payloads_evict_beyond_keep_images() {
        let mut w = ConversationMemory::new(50, 2);
        w.append(image_msg("t1", 0, "img-a"));
        w.append(image_msg("t2", 0, "img-b"));
        w.append(image_msg("t3", 0, "img-c"));
        let inline: Vec<bool> = w
            .snapshot()
            .iter()
            .map(|m| m.image_base64.is_some())
            .collect();
        assert_eq!(inline.iter().filter(|b| **b).count(), 2);
        // Ids survive payload eviction.
        assert!(w.snapshot().iter().all(|m| m.image_id().is_some()));
    }

    #[test]
    fn turn_anchors_keep_their_payload() {
        let mut w = ConversationMemory::new(50, 2);
        // One turn with three frames: first and last are anchors, the middle
        // one is the only eviction candidate.
        w.append(image_msg("t1", 0, "img-first"));
        w.append(image_msg("t1", 1, "img-mid"));
        w.append(image_msg("t1", 2, "img-last"));
        let snap = w.snapshot();
        let by_id = |id: &str| snap.iter().find(|m| m.image_id() == Some(id)).unwrap();
        assert!(by_id("img-first").image_base64.is_some());
        assert!(by_id("img-mid").image_base64.is_none());
        assert!(by_id("img-last").image_base64.is_some());
    }

    #[test]
    fn anchors_only_violation_warns_and_keeps_payloads() {
        let mut w = ConversationMemory::new(50, 1);
        // Two frames in one turn: both are anchors (first & last), so the
        // keep_images=1 bound cannot be satisfied without touching anchors.
        w.append(image_msg("t1", 0, "img-first"));
        w.append(image_msg("t1", 1, "img-last"));
        let inline = w
            .snapshot()
            .iter()
            .filter(|m| m.image_base64.is_some())
            .count();
        assert_eq!(inline, 2, "anchors keep bytes even over the bound");
    }

    #[test]
    fn anchors_of_reports_first_and_last() {
        let mut w = ConversationMemory::new(50, 10);
        w.append(image_msg("t1", 0, "img-a"));
        w.append(image_msg("t1", 1, "img-b"));
        w.append(image_msg("t1", 2, "img-c"));
        assert_eq!(
            w.anchors_of("t1"),
            Some(("img-a".to_string(), "img-c".to_string()))
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut w = ConversationMemory::new(10, 10);
        w.append(image_msg("t1", 0, "img-a"));
        w.clear();
        assert!(w.is_empty());
        assert!(w.anchors_of("t1").is_none());
    }

    #[test]
    fn replace_head_swaps_prefix_for_summary() {
        let mut w = ConversationMemory::new(20, 10);
        for i in 0..6 {
            w.append(user("t1", i, &format!("m{i}")));
        }
        let summary = StoredMessage::new(
            MessageBody::SystemObservation {
                text: "summary of earlier conversation".into(),
                image_id: None,
            },
            "t1",
            0,
        );
        w.replace_head(4, summary);
        assert_eq!(w.len(), 3);
        assert!(w.snapshot()[0].text_content().contains("summary"));
        assert_eq!(w.snapshot()[1].text_content(), "m4");
    }
}
