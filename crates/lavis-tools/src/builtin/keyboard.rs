// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Keyboard tools: free text entry plus a family of named key chords.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actuator::{InputActuator, KeyChord};
use crate::tool::{arg_str, Tool, ToolCall, ToolOutput};

// ─── type_text ────────────────────────────────────────────────────────────────

pub struct TypeTextTool {
    actuator: Arc<dyn InputActuator>,
}

impl TypeTextTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_text"
    }
    fn description(&self) -> &str {
        "Type text into the currently focused element. Click the target field \
         first if it is not already focused."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The text to type" }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        1500
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let text = match arg_str(call, "text") {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.actuator.type_text(&text).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── key chord family ─────────────────────────────────────────────────────────

/// One tool per named chord: `press_enter`, `copy`, `select_all`, …
pub struct KeyChordTool {
    actuator: Arc<dyn InputActuator>,
    chord: KeyChord,
    name: &'static str,
    description: &'static str,
}

impl KeyChordTool {
    pub fn new(actuator: Arc<dyn InputActuator>, chord: KeyChord) -> Self {
        let (name, description) = match chord {
            KeyChord::Enter => ("press_enter", "Press the Enter/Return key."),
            KeyChord::Escape => ("press_escape", "Press the Escape key."),
            KeyChord::Tab => ("press_tab", "Press the Tab key."),
            KeyChord::Backspace => ("press_backspace", "Press the Backspace key once."),
            KeyChord::Copy => ("copy", "Copy the current selection to the clipboard."),
            KeyChord::Paste => ("paste", "Paste the clipboard at the cursor."),
            KeyChord::SelectAll => ("select_all", "Select all content in the focused element."),
            KeyChord::Save => ("save", "Send the save shortcut to the focused application."),
            KeyChord::Undo => ("undo", "Send the undo shortcut to the focused application."),
        };
        Self {
            actuator,
            chord,
            name,
            description,
        }
    }

    /// Every chord tool, for registry assembly.
    pub fn all(actuator: &Arc<dyn InputActuator>) -> Vec<Self> {
        [
            KeyChord::Enter,
            KeyChord::Escape,
            KeyChord::Tab,
            KeyChord::Backspace,
            KeyChord::Copy,
            KeyChord::Paste,
            KeyChord::SelectAll,
            KeyChord::Save,
            KeyChord::Undo,
        ]
        .into_iter()
        .map(|chord| Self::new(Arc::clone(actuator), chord))
        .collect()
    }
}

#[async_trait]
impl Tool for KeyChordTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        self.description
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.actuator.press_key(self.chord).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
