// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! OS-level tools: launching and quitting applications, opening URLs and
//! files, notifications, and script execution.
//!
//! Scripts (`execute_shell`, `execute_applescript`) spawn child processes
//! directly; everything else goes through the [`InputActuator`] boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actuator::InputActuator;
use crate::command::{head_tail_truncate, run_shell};
use crate::tool::{arg_str, Tool, ToolCall, ToolOutput};

fn single_string_schema(key: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            key: { "type": "string", "description": description }
        },
        "required": [key],
        "additionalProperties": false
    })
}

/// Which actuator entry point an [`OsActionTool`] dispatches to.
#[derive(Debug, Clone, Copy)]
enum OsAction {
    OpenApp,
    OpenUrl,
    OpenFile,
    QuitApp,
}

/// Covers the four string-argument actuator actions; the variant fixes the
/// name, argument key, and settle time.
pub struct OsActionTool {
    actuator: Arc<dyn InputActuator>,
    action: OsAction,
}

impl OsActionTool {
    pub fn open_app(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            action: OsAction::OpenApp,
        }
    }
    pub fn open_url(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            action: OsAction::OpenUrl,
        }
    }
    pub fn open_file(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            action: OsAction::OpenFile,
        }
    }
    pub fn quit_app(actuator: Arc<dyn InputActuator>) -> Self {
        Self {
            actuator,
            action: OsAction::QuitApp,
        }
    }

    fn arg_key(&self) -> &'static str {
        match self.action {
            OsAction::OpenApp | OsAction::QuitApp => "name",
            OsAction::OpenUrl => "url",
            OsAction::OpenFile => "path",
        }
    }
}

#[async_trait]
impl Tool for OsActionTool {
    fn name(&self) -> &str {
        match self.action {
            OsAction::OpenApp => "open_app",
            OsAction::OpenUrl => "open_url",
            OsAction::OpenFile => "open_file",
            OsAction::QuitApp => "quit_app",
        }
    }
    fn description(&self) -> &str {
        match self.action {
            OsAction::OpenApp => "Launch (or bring to front) an application by name.",
            OsAction::OpenUrl => "Open a URL in the default browser.",
            OsAction::OpenFile => "Open a file with its default application.",
            OsAction::QuitApp => "Quit an application by name.",
        }
    }
    fn parameters_schema(&self) -> Value {
        match self.action {
            OsAction::OpenApp => single_string_schema("name", "Application name"),
            OsAction::OpenUrl => single_string_schema("url", "URL to open"),
            OsAction::OpenFile => single_string_schema("path", "Absolute file path"),
            OsAction::QuitApp => single_string_schema("name", "Application name"),
        }
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        match self.action {
            OsAction::OpenApp | OsAction::OpenUrl => 2000,
            OsAction::OpenFile => 1500,
            OsAction::QuitApp => 200,
        }
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let value = match arg_str(call, self.arg_key()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let result = match self.action {
            OsAction::OpenApp => self.actuator.open_app(&value).await,
            OsAction::OpenUrl => self.actuator.open_url(&value).await,
            OsAction::OpenFile => self.actuator.open_file(&value).await,
            OsAction::QuitApp => self.actuator.quit_app(&value).await,
        };
        match result {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── list_apps ────────────────────────────────────────────────────────────────

pub struct ListAppsTool {
    actuator: Arc<dyn InputActuator>,
}

impl ListAppsTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for ListAppsTool {
    fn name(&self) -> &str {
        "list_apps"
    }
    fn description(&self) -> &str {
        "List currently running applications."
    }
    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.actuator.list_apps().await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── show_notification ────────────────────────────────────────────────────────

pub struct ShowNotificationTool {
    actuator: Arc<dyn InputActuator>,
}

impl ShowNotificationTool {
    pub fn new(actuator: Arc<dyn InputActuator>) -> Self {
        Self { actuator }
    }
}

#[async_trait]
impl Tool for ShowNotificationTool {
    fn name(&self) -> &str {
        "show_notification"
    }
    fn description(&self) -> &str {
        "Show a desktop notification to the user."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "message": { "type": "string" }
            },
            "required": ["title", "message"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let title = match arg_str(call, "title") {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let message = match arg_str(call, "message") {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.actuator.show_notification(&title, &message).await {
            Ok(msg) => ToolOutput::ok(&call.id, msg),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── execute_shell ────────────────────────────────────────────────────────────

pub struct ExecuteShellTool {
    pub timeout_secs: u64,
}

impl Default for ExecuteShellTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for ExecuteShellTool {
    fn name(&self) -> &str {
        "execute_shell"
    }
    fn description(&self) -> &str {
        "Execute a shell command and return stdout + stderr. \
         Output is capped at ~20 KB; when larger, the first 100 and last 100 \
         lines are preserved with an omission marker in the middle. \
         Prefer non-interactive commands; avoid commands that require a TTY."
    }
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete bash one-liner to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        1200
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match arg_str(call, "command") {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);
        match run_shell(&command, timeout).await {
            Ok(out) => ToolOutput::ok(&call.id, out),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── execute_applescript ──────────────────────────────────────────────────────

pub struct ExecuteAppleScriptTool {
    pub timeout_secs: u64,
}

impl Default for ExecuteAppleScriptTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for ExecuteAppleScriptTool {
    fn name(&self) -> &str {
        "execute_applescript"
    }
    fn description(&self) -> &str {
        "Run an AppleScript via osascript and return its output. \
         Only available on macOS hosts."
    }
    fn parameters_schema(&self) -> Value {
        single_string_schema("script", "The AppleScript source to run")
    }
    fn visual_impact(&self) -> bool {
        true
    }
    fn post_action_wait_ms(&self) -> u64 {
        1200
    }
    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let script = match arg_str(call, "script") {
            Ok(s) => s,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            tokio::process::Command::new("osascript")
                .arg("-e")
                .arg(&script)
                .stdin(std::process::Stdio::null())
                .output(),
        )
        .await;
        match result {
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                ToolOutput::ok(&call.id, head_tail_truncate(stdout.trim()))
            }
            Ok(Ok(output)) => ToolOutput::err(
                &call.id,
                format!(
                    "osascript exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ),
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn error: {e}")),
            Err(_) => ToolOutput::err(
                &call.id,
                format!("timeout after {}s", self.timeout_secs),
            ),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
