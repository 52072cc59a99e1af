// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// Prefix on every failure string surfaced to the model or the frontend.
pub const FAILURE_MARKER: &str = "❌ ";

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque correlation id from the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.  Always a non-empty string; failures are
/// human-readable strings prefixed with [`FAILURE_MARKER`].
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// If true, the tool execution failed non-fatally.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.is_empty() {
            content = "(done)".into();
        }
        Self {
            call_id: call_id.into(),
            content,
            is_error: false,
        }
    }

    /// Error result.  The failure marker is prepended when absent.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let content = if msg.starts_with(FAILURE_MARKER) {
            msg
        } else {
            format!("{FAILURE_MARKER}{msg}")
        };
        Self {
            call_id: call_id.into(),
            content,
            is_error: true,
        }
    }
}

/// Trait that every built-in and skill-backed tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// True when executing this tool plausibly changes the screen and the
    /// loop should re-perceive afterwards.
    fn visual_impact(&self) -> bool {
        false
    }
    /// Post-action settle time before the re-perception capture, in
    /// milliseconds.  Only consulted for visual-impact tools.
    fn post_action_wait_ms(&self) -> u64 {
        200
    }
    /// Execute the tool.  Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Argument helpers ─────────────────────────────────────────────────────────

/// Upper bound of the normalized coordinate space on both axes.
pub const COORD_MAX: i64 = 1000;

/// Extract a required string argument.
pub fn arg_str(call: &ToolCall, key: &str) -> Result<String, String> {
    call.args
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| format!("missing '{key}' parameter"))
}

/// Extract a normalized `[x, y]` coordinate pair from `args[key]`.
///
/// The model emits integer pairs in [0, 1000]×[0, 1000]; anything malformed
/// or out of range is rejected here, before the actuator is ever invoked.
pub fn arg_coordinate(call: &ToolCall, key: &str) -> Result<(i64, i64), String> {
    let pair = call
        .args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| format!("missing '{key}' parameter; expected [x, y]"))?;
    if pair.len() != 2 {
        return Err(format!("'{key}' must be a two-element [x, y] array"));
    }
    let x = pair[0]
        .as_i64()
        .ok_or_else(|| format!("'{key}' x must be an integer"))?;
    let y = pair[1]
        .as_i64()
        .ok_or_else(|| format!("'{key}' y must be an integer"))?;
    if !(0..=COORD_MAX).contains(&x) || !(0..=COORD_MAX).contains(&y) {
        return Err(format!(
            "coordinate ({x}, {y}) is outside the normalized [0, {COORD_MAX}] space"
        ));
    }
    Ok((x, y))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
