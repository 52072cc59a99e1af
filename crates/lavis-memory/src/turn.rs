// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Ambient turn identification, scoped to one unit of work.
//!
//! No thread-local globals: each inbound request (or scheduled execution)
//! constructs its own [`TurnContext`] and threads it through the call graph.
//! Two concurrent units of work therefore never observe each other's turn.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One user-originated reasoning request.  Copies are values; the
/// authoritative record lives inside the owning [`TurnContext`].
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: String,
    pub session_key: String,
    /// Image ids recorded during the turn, strictly append-ordered with
    /// consecutive duplicates collapsed.
    pub image_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct Slot {
    turn: Option<Turn>,
    depth: u32,
}

/// Per-unit-of-work turn holder.  Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct TurnContext {
    inner: Arc<Mutex<Slot>>,
}

impl TurnContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a turn and install it as current.  Re-entrant: if a turn is
    /// already current, it is returned unchanged and the nesting depth
    /// increments — the outer turn wins.
    pub fn begin(&self, session_key: &str) -> Turn {
        let mut slot = self.inner.lock().unwrap();
        slot.depth += 1;
        if let Some(turn) = &slot.turn {
            return turn.clone();
        }
        let turn = Turn {
            id: Uuid::new_v4().to_string(),
            session_key: session_key.to_string(),
            image_ids: Vec::new(),
            started_at: Utc::now(),
        };
        slot.turn = Some(turn.clone());
        turn
    }

    /// Snapshot of the in-flight turn, if any.
    pub fn current(&self) -> Option<Turn> {
        self.inner.lock().unwrap().turn.clone()
    }

    /// Close the turn installed by the matching `begin`.
    ///
    /// Returns the finished turn only when the outermost `begin` is being
    /// matched; inner ends return `None`.  An `end` without any `begin` is a
    /// no-op.
    pub fn end(&self) -> Option<Turn> {
        let mut slot = self.inner.lock().unwrap();
        if slot.depth == 0 {
            return None;
        }
        slot.depth -= 1;
        if slot.depth == 0 {
            slot.turn.take()
        } else {
            None
        }
    }

    /// Append an image id to the current turn.  Consecutive duplicates
    /// collapse; a no-op when no turn is current.
    pub fn record_image(&self, image_id: &str) {
        let mut slot = self.inner.lock().unwrap();
        if let Some(turn) = slot.turn.as_mut() {
            if turn.image_ids.last().map(String::as_str) != Some(image_id) {
                turn.image_ids.push(image_id.to_string());
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
