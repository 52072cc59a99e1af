// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `false`, so fields
/// that should be enabled unless explicitly disabled need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Input-actuator command templates (action name → shell template with
    /// `{x}`/`{y}`/`{text}`-style placeholders).  Empty means no real
    /// actuator is wired and actions are logged only.
    #[serde(default)]
    pub actuator: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" (any OpenAI-compatible endpoint) | "mock"
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies or gateways.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
        }
    }
}

impl ModelConfig {
    /// Resolve the API key: explicit value wins, then the named environment
    /// variable, then the provider's canonical variable (`OPENAI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.api_key {
            return Some(k.clone());
        }
        if let Some(env) = &self.api_key_env {
            if let Ok(v) = std::env::var(env) {
                return Some(v);
            }
        }
        std::env::var("OPENAI_API_KEY").ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step cap for `/api/agent/chat` requests.  `0` means unbounded —
    /// the loop runs until the model stops calling tools or invokes the
    /// terminator tool.
    #[serde(default = "AgentConfig::default_max_steps")]
    pub max_steps: u32,
    /// Model-call retry budget (quota and transient failures alike).
    #[serde(default = "AgentConfig::default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base delay for the retry backoff.  Quota failures double this per
    /// attempt; other transient failures wait the base delay each time.
    #[serde(default = "AgentConfig::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Per-tool post-action wait overrides (tool name → milliseconds).
    /// Tools not listed use their built-in defaults.
    #[serde(default)]
    pub tool_waits_ms: HashMap<String, u64>,
    /// Shell command timeout for the execute_shell tool.
    #[serde(default = "AgentConfig::default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
}

impl AgentConfig {
    fn default_max_steps() -> u32 {
        25
    }
    fn default_retry_attempts() -> u32 {
        3
    }
    fn default_retry_base_delay_ms() -> u64 {
        2000
    }
    fn default_shell_timeout_secs() -> u64 {
        30
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: Self::default_max_steps(),
            retry_attempts: Self::default_retry_attempts(),
            retry_base_delay_ms: Self::default_retry_base_delay_ms(),
            tool_waits_ms: HashMap::new(),
            shell_timeout_secs: Self::default_shell_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum messages held in the in-memory conversation window.
    #[serde(default = "MemoryConfig::default_window_size")]
    pub window_size: usize,
    /// Maximum messages in the window allowed to keep an inline image payload.
    #[serde(default = "MemoryConfig::default_keep_images")]
    pub keep_images: usize,
    /// Session token estimate above which summary compression fires.
    #[serde(default = "MemoryConfig::default_summary_token_threshold")]
    pub summary_token_threshold: usize,
    /// Cold storage retention, in days.
    #[serde(default = "MemoryConfig::default_cold_retention_days")]
    pub cold_retention_days: u32,
    /// Root directory for offloaded image blobs.
    /// Defaults to `~/.lavis/cold` when unset.
    pub cold_root: Option<PathBuf>,
    /// SQLite database path.  Defaults to `~/.lavis/lavis.db` when unset.
    pub db_path: Option<PathBuf>,
    /// Regex patterns marking a message as an exception frame whose image is
    /// never archived during turn compaction.
    #[serde(default = "MemoryConfig::default_exception_patterns")]
    pub exception_patterns: Vec<String>,
}

impl MemoryConfig {
    fn default_window_size() -> usize {
        20
    }
    fn default_keep_images() -> usize {
        10
    }
    fn default_summary_token_threshold() -> usize {
        100_000
    }
    fn default_cold_retention_days() -> u32 {
        14
    }
    fn default_exception_patterns() -> Vec<String> {
        vec![
            r"(?i)\berror\b".into(),
            r"(?i)\bfailed\b".into(),
            "❌".into(),
        ]
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: Self::default_window_size(),
            keep_images: Self::default_keep_images(),
            summary_token_threshold: Self::default_summary_token_threshold(),
            cold_retention_days: Self::default_cold_retention_days(),
            cold_root: None,
            db_path: None,
            exception_patterns: Self::default_exception_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    /// Hamming-distance threshold for screenshot deduplication (0..=64).
    /// `0` treats every capture as new; `64` reuses everything after the first.
    #[serde(default = "PerceptionConfig::default_dedup_threshold")]
    pub dedup_threshold: u32,
    /// External command that writes a PNG screenshot to the path given as
    /// its last argument.  When unset, the process must be wired with a
    /// perceiver programmatically (tests use mocks).
    pub capture_command: Option<String>,
}

impl PerceptionConfig {
    fn default_dedup_threshold() -> u32 {
        10
    }
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: Self::default_dedup_threshold(),
            capture_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Root directory scanned for `<id>/SKILL.md` packages.
    /// Defaults to `~/.lavis/skills` when unset.
    pub root: Option<PathBuf>,
    /// Hot-reload poll interval in seconds.
    #[serde(default = "SkillsConfig::default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Whether the background reload task is spawned at all.
    #[serde(default = "default_true")]
    pub hot_reload: bool,
}

impl SkillsConfig {
    fn default_reload_interval_secs() -> u64 {
        5
    }
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            root: None,
            reload_interval_secs: Self::default_reload_interval_secs(),
            hot_reload: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// SQLite database path for tasks and run logs.
    /// Defaults to the memory database when unset.
    pub db_path: Option<PathBuf>,
    /// Start the tick loop automatically on boot.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address for the HTTP surface.
    #[serde(default = "GatewayConfig::default_bind")]
    pub bind: String,
}

impl GatewayConfig {
    fn default_bind() -> String {
        "127.0.0.1:8377".into()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

// ─── Default path helpers ─────────────────────────────────────────────────────

/// `~/.lavis` (or `./.lavis` when no home directory can be resolved).
pub fn app_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lavis")
}

impl MemoryConfig {
    pub fn cold_root_or_default(&self) -> PathBuf {
        self.cold_root.clone().unwrap_or_else(|| app_root().join("cold"))
    }

    pub fn db_path_or_default(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| app_root().join("lavis.db"))
    }
}

impl SkillsConfig {
    pub fn root_or_default(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| app_root().join("skills"))
    }
}

impl SchedulerConfig {
    pub fn db_path_or_default(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| app_root().join("scheduler.db"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
