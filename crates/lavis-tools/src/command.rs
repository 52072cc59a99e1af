// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The shared command grammar and the shell runner.
//!
//! Skills and scheduled tasks carry a command string of the form
//! `agent:<goal>` (enter the reasoning loop), `shell:<cmd>` (spawn a child
//! process), or a bare string which defaults to shell.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command as ProcessCommand;
use tracing::debug;

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;
/// Lines kept from the head of oversized output.
const HEAD_LINES: usize = 100;
/// Lines kept from the tail of oversized output.  Errors and summaries
/// almost always appear at the end, so the tail matters at least as much as
/// the head.
const TAIL_LINES: usize = 100;

/// A parsed command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enter the reasoning loop with this goal.
    Agent(String),
    /// Spawn a shell child with this command line.
    Shell(String),
}

impl Command {
    /// Parse the command grammar.  `agent:` and `shell:` prefixes are
    /// stripped; anything else defaults to shell.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(goal) = raw.strip_prefix("agent:") {
            Command::Agent(goal.trim().to_string())
        } else if let Some(cmd) = raw.strip_prefix("shell:") {
            Command::Shell(cmd.trim().to_string())
        } else {
            Command::Shell(raw.to_string())
        }
    }
}

/// Something that can run a goal through the reasoning loop.
///
/// Implemented by the orchestrator; consumed by skills and the scheduler so
/// neither crate needs to depend on the loop itself.
#[async_trait]
pub trait GoalRunner: Send + Sync {
    /// Run a goal to completion and return the final response text.
    /// A terminal failure surfaces as `Err`.
    async fn run_goal(&self, goal: &str) -> anyhow::Result<String>;
}

/// Run a shell command and capture its output, applying head/tail
/// truncation so a runaway command cannot flood the conversation window.
pub async fn run_shell(command: &str, timeout_secs: u64) -> anyhow::Result<String> {
    debug!(cmd = %command, "running shell command");
    let mut cmd = ProcessCommand::new("bash");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        cmd.output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => {
            let mut content = String::new();
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.is_empty() {
                content.push_str(&head_tail_truncate(&stdout));
            }
            if !stderr.is_empty() {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str("[stderr]\n");
                content.push_str(&head_tail_truncate(&stderr));
            }
            let code = output.status.code().unwrap_or(-1);
            if content.is_empty() {
                content = format!("[exit {code}]");
            }
            if code == 0 {
                Ok(content)
            } else {
                anyhow::bail!("[exit {code}]\n{content}")
            }
        }
        Ok(Err(e)) => anyhow::bail!("spawn error: {e}"),
        Err(_) => anyhow::bail!("timeout after {timeout_secs}s"),
    }
}

/// Truncate `s` to fit within `OUTPUT_LIMIT_BYTES`, keeping the first
/// `HEAD_LINES` and last `TAIL_LINES` with an omission marker between.
pub fn head_tail_truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }

    let lines: Vec<&str> = s.lines().collect();
    let total = lines.len();

    if total <= HEAD_LINES + TAIL_LINES {
        // Byte budget exceeded by very long lines — fall back to byte-level
        // head+tail windows.  The raw offsets can land inside a multibyte
        // character, so both are snapped to char boundaries before slicing.
        let tail_start =
            ceil_char_boundary(s, s.len().saturating_sub(OUTPUT_LIMIT_BYTES / 2));
        let tail_str = &s[tail_start..];
        let head_end = floor_char_boundary(s, (OUTPUT_LIMIT_BYTES / 2).min(s.len()));
        let head_str = &s[..head_end];
        let omitted = s.len().saturating_sub(head_str.len() + tail_str.len());
        return format!("{head_str}\n...[{omitted} bytes omitted]...\n{tail_str}");
    }

    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[total - TAIL_LINES..].join("\n");
    let omitted_lines = total - HEAD_LINES - TAIL_LINES;
    let omitted_bytes = s.len().saturating_sub(head.len() + tail.len());
    format!("{head}\n...[{omitted_lines} lines / ~{omitted_bytes} bytes omitted]...\n{tail}")
}

/// Largest char-boundary index ≤ `i`.
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char-boundary index ≥ `i`.
fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Grammar ───────────────────────────────────────────────────────────────

    #[test]
    fn agent_prefix_parses_to_agent() {
        assert_eq!(
            Command::parse("agent:refresh inbox"),
            Command::Agent("refresh inbox".into())
        );
    }

    #[test]
    fn shell_prefix_parses_to_shell() {
        assert_eq!(Command::parse("shell:ls -la"), Command::Shell("ls -la".into()));
    }

    #[test]
    fn bare_string_defaults_to_shell() {
        assert_eq!(Command::parse("echo hi"), Command::Shell("echo hi".into()));
    }

    #[test]
    fn prefixes_trim_whitespace() {
        assert_eq!(
            Command::parse("  agent:  log in  "),
            Command::Agent("log in".into())
        );
    }

    // ── Shell runner ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shell_captures_stdout() {
        let out = run_shell("echo hello", 10).await.unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn shell_nonzero_exit_is_error_with_code() {
        let err = run_shell("echo oops >&2; exit 2", 10).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("[exit 2]"));
        assert!(msg.contains("oops"));
    }

    #[tokio::test]
    async fn shell_timeout_is_error() {
        let err = run_shell("sleep 60", 1).await.unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    // ── Truncation ────────────────────────────────────────────────────────────

    #[test]
    fn short_output_passes_through_unchanged() {
        let s = "hello\nworld\n";
        assert_eq!(head_tail_truncate(s), s);
    }

    #[test]
    fn multibyte_single_line_truncates_without_panicking() {
        // One long line of three-byte characters: the byte-level fallback
        // offsets land mid-character unless snapped to boundaries.
        let s = "語".repeat(12_000); // 36 KB on one line
        let result = head_tail_truncate(&s);
        assert!(result.contains("omitted"));
        assert!(result.len() < s.len());
        assert!(result.starts_with('語'));
        assert!(result.ends_with('語'));
    }

    #[test]
    fn multibyte_few_lines_truncates_without_panicking() {
        // Mixed emoji/ASCII across a handful of long lines — still under the
        // head+tail line counts, so the byte fallback is exercised.
        let line = "progress 🚀🚀🚀 ".repeat(400);
        let s = [line.as_str(); 5].join("\n");
        assert!(s.len() > 20_000);
        let result = head_tail_truncate(&s);
        assert!(result.contains("omitted"));
        assert!(result.len() < s.len());
    }

    #[test]
    fn char_boundary_helpers_snap_correctly() {
        let s = "aé語"; // 1 + 2 + 3 bytes
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(ceil_char_boundary(s, 2), 3);
        assert_eq!(floor_char_boundary(s, 0), 0);
        assert_eq!(ceil_char_boundary(s, s.len()), s.len());
    }

    #[test]
    fn head_and_tail_are_both_preserved() {
        let mut lines: Vec<String> = vec!["RUN START".to_string()];
        for i in 0..800 {
            lines.push(format!("middle line {i} padding padding padding padding"));
        }
        lines.push("RUN ERROR".to_string());
        let content = lines.join("\n");

        let result = head_tail_truncate(&content);
        assert!(result.contains("RUN START"));
        assert!(result.contains("RUN ERROR"));
        assert!(result.contains("omitted"));
        assert!(result.len() < content.len());
    }
}
