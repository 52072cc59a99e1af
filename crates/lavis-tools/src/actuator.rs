// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The OS input boundary.
//!
//! The core never talks to the OS input primitive directly; it consumes it
//! through [`InputActuator`].  Coordinates arrive normalized in
//! [0, 1000]×[0, 1000] — mapping to the current screen's logical coordinate
//! space is the actuator's job, not the caller's.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

impl std::fmt::Display for MouseButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Right => write!(f, "right"),
        }
    }
}

/// Named key chords the keyboard tools can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyChord {
    Enter,
    Escape,
    Tab,
    Backspace,
    Copy,
    Paste,
    SelectAll,
    Save,
    Undo,
}

impl KeyChord {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyChord::Enter => "enter",
            KeyChord::Escape => "escape",
            KeyChord::Tab => "tab",
            KeyChord::Backspace => "backspace",
            KeyChord::Copy => "copy",
            KeyChord::Paste => "paste",
            KeyChord::SelectAll => "select_all",
            KeyChord::Save => "save",
            KeyChord::Undo => "undo",
        }
    }
}

/// One function per built-in OS action.  Every method returns a short human
/// message on success; failures come back as `Err` and are converted to
/// failure strings by the tool layer.
#[async_trait]
pub trait InputActuator: Send + Sync {
    async fn move_mouse(&self, x: i64, y: i64) -> anyhow::Result<String>;
    async fn click(
        &self,
        x: i64,
        y: i64,
        button: MouseButton,
        double: bool,
    ) -> anyhow::Result<String>;
    async fn drag(&self, from: (i64, i64), to: (i64, i64)) -> anyhow::Result<String>;
    async fn scroll(&self, x: i64, y: i64, dx: i64, dy: i64) -> anyhow::Result<String>;
    async fn type_text(&self, text: &str) -> anyhow::Result<String>;
    async fn press_key(&self, chord: KeyChord) -> anyhow::Result<String>;
    async fn open_app(&self, name: &str) -> anyhow::Result<String>;
    async fn open_url(&self, url: &str) -> anyhow::Result<String>;
    async fn open_file(&self, path: &str) -> anyhow::Result<String>;
    async fn quit_app(&self, name: &str) -> anyhow::Result<String>;
    async fn list_apps(&self) -> anyhow::Result<String>;
    async fn show_notification(&self, title: &str, message: &str) -> anyhow::Result<String>;
    async fn mouse_position(&self) -> anyhow::Result<String>;
}

// ─── Mock actuator ────────────────────────────────────────────────────────────

/// Records every invocation as a formatted string; optionally fails on a
/// named action.  Used by tests and as the safe default when no real
/// actuator is configured (actions are logged, nothing happens).
#[derive(Default)]
pub struct MockActuator {
    pub calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any action whose recorded form starts with `prefix`.
    pub fn failing_on(prefix: impl Into<String>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(prefix.into()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, entry: String) -> anyhow::Result<String> {
        debug!(action = %entry, "mock actuator");
        let failed = self
            .fail_on
            .as_deref()
            .is_some_and(|p| entry.starts_with(p));
        self.calls.lock().unwrap().push(entry.clone());
        if failed {
            anyhow::bail!("actuator failure injected for {entry}");
        }
        Ok(format!("done: {entry}"))
    }
}

#[async_trait]
impl InputActuator for MockActuator {
    async fn move_mouse(&self, x: i64, y: i64) -> anyhow::Result<String> {
        self.record(format!("move_mouse({x},{y})"))
    }
    async fn click(
        &self,
        x: i64,
        y: i64,
        button: MouseButton,
        double: bool,
    ) -> anyhow::Result<String> {
        let kind = if double { "double" } else { "single" };
        self.record(format!("click({x},{y},{button},{kind})"))
    }
    async fn drag(&self, from: (i64, i64), to: (i64, i64)) -> anyhow::Result<String> {
        self.record(format!(
            "drag({},{})->({},{})",
            from.0, from.1, to.0, to.1
        ))
    }
    async fn scroll(&self, x: i64, y: i64, dx: i64, dy: i64) -> anyhow::Result<String> {
        self.record(format!("scroll({x},{y},{dx},{dy})"))
    }
    async fn type_text(&self, text: &str) -> anyhow::Result<String> {
        self.record(format!("type_text({text})"))
    }
    async fn press_key(&self, chord: KeyChord) -> anyhow::Result<String> {
        self.record(format!("press_key({})", chord.as_str()))
    }
    async fn open_app(&self, name: &str) -> anyhow::Result<String> {
        self.record(format!("open_app({name})"))
    }
    async fn open_url(&self, url: &str) -> anyhow::Result<String> {
        self.record(format!("open_url({url})"))
    }
    async fn open_file(&self, path: &str) -> anyhow::Result<String> {
        self.record(format!("open_file({path})"))
    }
    async fn quit_app(&self, name: &str) -> anyhow::Result<String> {
        self.record(format!("quit_app({name})"))
    }
    async fn list_apps(&self) -> anyhow::Result<String> {
        self.record("list_apps()".into())
    }
    async fn show_notification(&self, title: &str, message: &str) -> anyhow::Result<String> {
        self.record(format!("show_notification({title},{message})"))
    }
    async fn mouse_position(&self) -> anyhow::Result<String> {
        self.record("mouse_position()".into())
    }
}

// ─── Command-backed actuator ──────────────────────────────────────────────────

/// Adapter around external input commands.
///
/// Each action maps to a shell template with `{x}`, `{y}`, `{x2}`, `{y2}`,
/// `{dx}`, `{dy}`, `{text}`, `{name}`, `{url}`, `{path}`, `{title}`,
/// `{message}`, `{chord}` placeholders, e.g. for `cliclick` or `xdotool`:
///
/// ```yaml
/// click: "xdotool mousemove {x} {y} click 1"
/// type_text: "xdotool type -- {text}"
/// ```
///
/// Actions without a template fail with a descriptive error.  Substituted
/// values are shell-quoted.
pub struct CommandActuator {
    templates: HashMap<String, String>,
}

impl CommandActuator {
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    async fn run(&self, action: &str, vars: &[(&str, String)]) -> anyhow::Result<String> {
        let template = self
            .templates
            .get(action)
            .ok_or_else(|| anyhow::anyhow!("no command template configured for '{action}'"))?;
        let mut line = template.clone();
        for (key, value) in vars {
            line = line.replace(&format!("{{{key}}}"), &shell_quote(value));
        }
        debug!(action, cmd = %line, "command actuator");
        let output = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&line)
            .stdin(std::process::Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!(
                "'{action}' command exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if stdout.is_empty() {
            format!("{action} done")
        } else {
            stdout
        })
    }
}

/// Single-quote a value for safe interpolation into a bash command line.
fn shell_quote(s: &str) -> String {
    // Numbers and plain words pass through; anything else is quoted.
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
impl InputActuator for CommandActuator {
    async fn move_mouse(&self, x: i64, y: i64) -> anyhow::Result<String> {
        self.run("move_mouse", &[("x", x.to_string()), ("y", y.to_string())])
            .await
    }
    async fn click(
        &self,
        x: i64,
        y: i64,
        button: MouseButton,
        double: bool,
    ) -> anyhow::Result<String> {
        let action = match (button, double) {
            (MouseButton::Left, false) => "click",
            (MouseButton::Left, true) => "double_click",
            (MouseButton::Right, _) => "right_click",
        };
        self.run(action, &[("x", x.to_string()), ("y", y.to_string())])
            .await
    }
    async fn drag(&self, from: (i64, i64), to: (i64, i64)) -> anyhow::Result<String> {
        self.run(
            "drag",
            &[
                ("x", from.0.to_string()),
                ("y", from.1.to_string()),
                ("x2", to.0.to_string()),
                ("y2", to.1.to_string()),
            ],
        )
        .await
    }
    async fn scroll(&self, x: i64, y: i64, dx: i64, dy: i64) -> anyhow::Result<String> {
        self.run(
            "scroll",
            &[
                ("x", x.to_string()),
                ("y", y.to_string()),
                ("dx", dx.to_string()),
                ("dy", dy.to_string()),
            ],
        )
        .await
    }
    async fn type_text(&self, text: &str) -> anyhow::Result<String> {
        self.run("type_text", &[("text", text.to_string())]).await
    }
    async fn press_key(&self, chord: KeyChord) -> anyhow::Result<String> {
        self.run("press_key", &[("chord", chord.as_str().to_string())])
            .await
    }
    async fn open_app(&self, name: &str) -> anyhow::Result<String> {
        self.run("open_app", &[("name", name.to_string())]).await
    }
    async fn open_url(&self, url: &str) -> anyhow::Result<String> {
        self.run("open_url", &[("url", url.to_string())]).await
    }
    async fn open_file(&self, path: &str) -> anyhow::Result<String> {
        self.run("open_file", &[("path", path.to_string())]).await
    }
    async fn quit_app(&self, name: &str) -> anyhow::Result<String> {
        self.run("quit_app", &[("name", name.to_string())]).await
    }
    async fn list_apps(&self) -> anyhow::Result<String> {
        self.run("list_apps", &[]).await
    }
    async fn show_notification(&self, title: &str, message: &str) -> anyhow::Result<String> {
        self.run(
            "show_notification",
            &[("title", title.to_string()), ("message", message.to_string())],
        )
        .await
    }
    async fn mouse_position(&self) -> anyhow::Result<String> {
        self.run("mouse_position", &[]).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_invocations_in_order() {
        let a = MockActuator::new();
        a.click(500, 400, MouseButton::Left, false).await.unwrap();
        a.type_text("hi").await.unwrap();
        assert_eq!(
            a.recorded(),
            vec!["click(500,400,left,single)", "type_text(hi)"]
        );
    }

    #[tokio::test]
    async fn mock_failure_injection() {
        let a = MockActuator::failing_on("open_app");
        assert!(a.open_app("Safari").await.is_err());
        assert!(a.click(1, 1, MouseButton::Left, false).await.is_ok());
    }

    #[tokio::test]
    async fn command_actuator_substitutes_and_runs() {
        let mut templates = HashMap::new();
        templates.insert("click".to_string(), "echo clicked {x} {y}".to_string());
        let a = CommandActuator::new(templates);
        let msg = a.click(10, 20, MouseButton::Left, false).await.unwrap();
        assert_eq!(msg, "clicked 10 20");
    }

    #[tokio::test]
    async fn command_actuator_missing_template_is_error() {
        let a = CommandActuator::new(HashMap::new());
        let err = a.type_text("x").await.unwrap_err();
        assert!(err.to_string().contains("no command template"));
    }

    #[tokio::test]
    async fn command_actuator_failure_propagates_stderr() {
        let mut templates = HashMap::new();
        templates.insert(
            "open_url".to_string(),
            "echo nope >&2; exit 3".to_string(),
        );
        let a = CommandActuator::new(templates);
        let err = a.open_url("http://x").await.unwrap_err().to_string();
        assert!(err.contains("exited with 3"));
        assert!(err.contains("nope"));
    }

    #[test]
    fn shell_quote_passes_plain_values() {
        assert_eq!(shell_quote("123"), "123");
        assert_eq!(shell_quote("/usr/bin"), "/usr/bin");
    }

    #[test]
    fn shell_quote_wraps_special_chars() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
