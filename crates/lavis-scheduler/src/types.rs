// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome state of a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failed,
    Running,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Running => "RUNNING",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            "RUNNING" => Ok(RunStatus::Running),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted scheduled task.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    /// UUID v4 string — primary key.
    pub id: String,
    pub name: String,
    pub description: String,
    /// 6-field cron expression (second, minute, hour, day-of-month, month,
    /// day-of-week), evaluated in the process's local zone.
    pub cron: String,
    /// Command grammar string: `agent:<goal>`, `shell:<cmd>`, or bare shell.
    pub command: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub run_count: u64,
}

/// One appended run-log row.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRunLog {
    pub id: i64,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RunStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Creation payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cron: String,
    pub command: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Partial-update payload; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cron: Option<String>,
    pub command: Option<String>,
    pub enabled: Option<bool>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
