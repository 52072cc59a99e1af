// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Turn-close visual compaction.
//!
//! A finished turn keeps its first frame (anchor) and last frame (result)
//! inline, plus any exception frames whose message text matches an
//! error-indicator pattern.  Every other frame's bytes move to cold storage
//! and the message is marked compressed — the reasoning stays legible later
//! while the window sheds most of its visual weight.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use regex::Regex;
use tracing::{debug, warn};

use crate::{cold::ColdStorage, turn::Turn, window::ConversationMemory};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    /// Image ids whose bytes were archived and whose messages were marked
    /// compressed.
    pub archived: Vec<String>,
    /// Image ids kept inline because their message matched an exception
    /// pattern.
    pub exceptions: Vec<String>,
}

pub struct VisualCompactor {
    exception_patterns: Vec<Regex>,
}

impl VisualCompactor {
    /// Build from configured pattern strings.  Invalid patterns are logged
    /// and skipped — a bad config entry must not disable compaction.
    pub fn new(patterns: &[String]) -> Self {
        let exception_patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid exception pattern; skipping");
                    None
                }
            })
            .collect();
        Self { exception_patterns }
    }

    fn is_exception(&self, text: &str) -> bool {
        self.exception_patterns.iter().any(|re| re.is_match(text))
    }

    /// Compact one finished turn in place.
    ///
    /// Turns with zero or one recorded image are no-ops: the single image is
    /// its own anchor and result.  Anchors are never archived.
    pub fn compact_turn(
        &self,
        turn: &Turn,
        window: &mut ConversationMemory,
        cold: &ColdStorage,
    ) -> CompactionOutcome {
        let mut outcome = CompactionOutcome::default();
        if turn.image_ids.len() <= 1 {
            return outcome;
        }

        let anchors: HashSet<&str> = [
            turn.image_ids.first().map(String::as_str),
            turn.image_ids.last().map(String::as_str),
        ]
        .into_iter()
        .flatten()
        .collect();

        for msg in window.messages_mut() {
            if msg.turn_id != turn.id {
                continue;
            }
            let Some(image_id) = msg.image_id().map(str::to_string) else {
                continue;
            };
            if anchors.contains(image_id.as_str()) {
                continue;
            }
            if self.is_exception(msg.text_content()) {
                outcome.exceptions.push(image_id);
                continue;
            }

            if let Some(b64) = msg.image_base64.take() {
                match B64.decode(&b64) {
                    Ok(bytes) => {
                        if let Err(e) = cold.archive(&image_id, &bytes) {
                            warn!(image_id = %image_id, error = %e, "cold archive failed");
                        }
                    }
                    Err(e) => {
                        warn!(image_id = %image_id, error = %e, "inline payload was not valid base64");
                    }
                }
            }
            msg.is_compressed = true;
            msg.token_estimate = msg.estimate_tokens();
            outcome.archived.push(image_id);
        }

        debug!(
            turn_id = %turn.id,
            archived = outcome.archived.len(),
            exceptions = outcome.exceptions.len(),
            "turn compacted"
        );
        outcome
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
