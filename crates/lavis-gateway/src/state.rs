// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Json;
use serde_json::json;
use tracing::error;

use lavis_core::Orchestrator;
use lavis_memory::MemoryManager;
use lavis_perception::DedupCapturer;
use lavis_scheduler::Scheduler;
use lavis_skills::SkillService;
use lavis_tools::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub skills: Arc<SkillService>,
    pub memory: Arc<MemoryManager>,
    pub capturer: Arc<DedupCapturer>,
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    /// Re-derive skill-backed tools after any skill mutation so the unified
    /// registry namespace stays current.
    pub fn refresh_skill_tools(&self) {
        let rejected = self.registry.set_skill_tools(self.skills.clone().skill_tools());
        if !rejected.is_empty() {
            error!(?rejected, "skill tools rejected due to name collisions");
        }
    }
}

/// Generic 500 payload.  The detail goes to the log, never to the client.
pub fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}

pub fn not_found(what: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
}

pub fn bad_request(msg: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": msg.to_string() })),
    )
}
