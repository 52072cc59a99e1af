// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! The screen-capture boundary.
//!
//! The OS capture primitive is an external collaborator; the core consumes
//! it through [`ScreenPerceiver`].  [`CommandPerceiver`] adapts any external
//! screenshot command; the mock perceivers drive tests deterministically.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::PerceptionError;

/// One captured frame: encoded PNG bytes plus pixel dimensions.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl RawFrame {
    /// Build a frame from encoded image bytes, reading dimensions from the
    /// header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PerceptionError> {
        let img =
            image::load_from_memory(&bytes).map_err(|e| PerceptionError::Decode(e.to_string()))?;
        Ok(Self {
            width: img.width(),
            height: img.height(),
            bytes,
        })
    }
}

/// Produces a screenshot on demand.  Must be reentrant: concurrent units of
/// work may capture at the same time.
#[async_trait]
pub trait ScreenPerceiver: Send + Sync {
    async fn capture(&self) -> Result<RawFrame, PerceptionError>;
}

// ─── Command-backed perceiver ─────────────────────────────────────────────────

/// Adapter around an external screenshot command.
///
/// The command is run via `bash -c` with the output path appended, e.g.
/// `screencapture -x` (macOS) or `grim` (Wayland).  The command must write a
/// PNG to that path and exit 0.
pub struct CommandPerceiver {
    command: String,
}

impl CommandPerceiver {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ScreenPerceiver for CommandPerceiver {
    async fn capture(&self) -> Result<RawFrame, PerceptionError> {
        let tmp = tempfile::Builder::new()
            .prefix("lavis-shot-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| PerceptionError::Capture(e.to_string()))?;
        let path = tmp.path().to_path_buf();

        let line = format!("{} {}", self.command, path.display());
        debug!(cmd = %line, "running capture command");
        let status = Command::new("bash")
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| PerceptionError::Capture(format!("spawn: {e}")))?;

        if !status.success() {
            return Err(PerceptionError::Capture(format!(
                "capture command exited with {}",
                status.code().unwrap_or(-1)
            )));
        }

        let bytes =
            std::fs::read(&path).map_err(|e| PerceptionError::Capture(format!("read: {e}")))?;
        RawFrame::from_bytes(bytes)
    }
}

// ─── Mock perceivers ──────────────────────────────────────────────────────────

/// Always returns the same frame.
pub struct StaticPerceiver {
    frame: RawFrame,
}

impl StaticPerceiver {
    pub fn new(frame: RawFrame) -> Self {
        Self { frame }
    }
}

#[async_trait]
impl ScreenPerceiver for StaticPerceiver {
    async fn capture(&self) -> Result<RawFrame, PerceptionError> {
        Ok(self.frame.clone())
    }
}

/// Returns frames from a fixed sequence, repeating the last one after the
/// sequence is exhausted.
pub struct SequencePerceiver {
    frames: Mutex<Vec<RawFrame>>,
    last: Mutex<Option<RawFrame>>,
}

impl SequencePerceiver {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        Self {
            frames: Mutex::new(frames),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ScreenPerceiver for SequencePerceiver {
    async fn capture(&self) -> Result<RawFrame, PerceptionError> {
        let mut frames = self.frames.lock().unwrap();
        if frames.is_empty() {
            return self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| PerceptionError::Capture("sequence exhausted".into()));
        }
        let frame = frames.remove(0);
        *self.last.lock().unwrap() = Some(frame.clone());
        Ok(frame)
    }
}

/// Always fails.  Exercises the screenshot-unavailable degradation path.
pub struct FailingPerceiver;

#[async_trait]
impl ScreenPerceiver for FailingPerceiver {
    async fn capture(&self) -> Result<RawFrame, PerceptionError> {
        Err(PerceptionError::Capture("display unavailable".into()))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
