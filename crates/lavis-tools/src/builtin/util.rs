// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Perception and utility tools, plus the terminator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actuator::InputActuator;
use crate::tool::{arg_coordinate, Tool, ToolCall, ToolOutput};

/// Reserved name of the terminator tool.
pub const TERMINATOR_NAME: &str = "complete_tool";

/// Reserved marker embedded in the terminator's output.  The loop requires
/// BOTH the name and this marker before ending the cycle, so a future tool
/// that happens to collide on name cannot terminate reasoning by accident.
pub const TERMINATOR_MARKER: &str = "[TASK_COMPLETE]";

// ─── capture_screen ───────────────────────────────────────────────────────────

/// Requests a fresh perception pass.
///
/// The tool does not capture anything itself: it is flagged visual-impact,
/// so the loop's post-action re-perception attaches a fresh screenshot to
/// the next observation message — exactly one capture, no double work.
pub struct CaptureScreenTool;

#[async_trait]
impl Tool for CaptureScreenTool {
    fn name(&self) -> &str {
        "capture_screen"
    }
    fn description(&self) -> &str {
        "Take a fresh screenshot. The new screen image is attached to the \
         next observation message."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        ToolOutput::ok(
            &call.id,
            "Screenshot requested; the fresh frame follows in the next observation.",
        )
    }
}

// ─── wait ─────────────────────────────────────────────────────────────────────

/// Upper bound for a single model-requested wait.
const MAX_WAIT_MS: u64 = 30_000;

pub struct WaitTool;

#[async_trait]
impl Tool for WaitTool {
    fn name(&self) -> &str {
        "wait"
    }
    fn description(&self) -> &str {
        "Wait for a UI transition to finish. 'duration_ms' is clamped to 30000."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "duration_ms": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": 30000,
                    "description": "How long to wait, in milliseconds (default 1000)"
                }
            },
            "additionalProperties": false
        })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        300
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let ms = call
            .args
            .get("duration_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(1000)
            .min(MAX_WAIT_MS);
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        ToolOutput::ok(&call.id, format!("waited {ms}ms"))
    }
}

// ─── get_mouse_info ───────────────────────────────────────────────────────────

pub struct GetMouseInfoTool {
    actuator: Arc<dyn InputActuator>,
}

impl GetMouseInfoTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for GetMouseInfoTool {
    fn name(&self) -> &str {
        "get_mouse_info"
    }
    fn description(&self) -> &str {
        "Report the current mouse pointer position."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.actuator.mouse_position().await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── verify_coordinate ────────────────────────────────────────────────────────

/// Validates a normalized coordinate without touching the actuator.  Lets
/// the model sanity-check a target before committing to a click.
pub struct VerifyCoordinateTool;

#[async_trait]
impl Tool for VerifyCoordinateTool {
    fn name(&self) -> &str {
        "verify_coordinate"
    }
    fn description(&self) -> &str {
        "Check that a normalized [x, y] coordinate is well-formed and inside \
         the 0..1000 space, and echo where on the screen it lands."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "coordinate": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0, "maximum": 1000 },
                    "minItems": 2, "maxItems": 2
                }
            },
            "required": ["coordinate"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match arg_coordinate(call, "coordinate") {
            Ok((x, y)) => ToolOutput::ok(
                &call.id,
                format!(
                    "coordinate ({x}, {y}) is valid — {:.0}% across, {:.0}% down the screen",
                    x as f64 / 10.0,
                    y as f64 / 10.0
                ),
            ),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

// ─── complete_tool (terminator) ───────────────────────────────────────────────

pub struct CompleteTool;

#[async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        TERMINATOR_NAME
    }
    fn description(&self) -> &str {
        "Signal that the task is complete. Call this exactly once, when the \
         goal has been accomplished or cannot be advanced further, with a \
         short summary of the outcome."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "One or two sentences describing the outcome"
                }
            },
            "additionalProperties": false
        })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let summary = call
            .args
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("task complete");
        ToolOutput::ok(&call.id, format!("{TERMINATOR_MARKER} {summary}"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
