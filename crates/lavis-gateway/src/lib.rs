// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The HTTP surface of the lavis cognitive core.
//!
//! All of it is optional for embedding — every capability is reachable
//! through the library crates — but a frontend needs exactly these routes:
//! reasoning under `/api/agent`, task scheduling under `/api/scheduler`,
//! and skill management under `/api/skills`.

mod routes;
mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use routes::{agent, scheduler, skills};

/// Request bodies are small JSON commands; 2 MB leaves generous headroom.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // ── Reasoning ──────────────────────────────────────────────
        .route("/api/agent/chat", post(agent::chat))
        .route("/api/agent/task", post(agent::task))
        .route("/api/agent/stop", post(agent::stop))
        .route("/api/agent/reset", post(agent::reset))
        .route("/api/agent/status", get(agent::status))
        .route("/api/agent/screenshot", get(agent::screenshot))
        .route(
            "/api/agent/history",
            get(agent::history).delete(agent::clear_history),
        )
        // ── Scheduler ──────────────────────────────────────────────
        .route(
            "/api/scheduler/tasks",
            get(scheduler::list).post(scheduler::create),
        )
        .route(
            "/api/scheduler/tasks/:id",
            get(scheduler::get)
                .put(scheduler::update)
                .delete(scheduler::delete),
        )
        .route("/api/scheduler/tasks/:id/pause", post(scheduler::pause))
        .route("/api/scheduler/tasks/:id/resume", post(scheduler::resume))
        .route("/api/scheduler/tasks/:id/run", post(scheduler::run_now))
        .route("/api/scheduler/tasks/:id/history", get(scheduler::history))
        .route("/api/scheduler/start", post(scheduler::start))
        .route("/api/scheduler/stop", post(scheduler::stop))
        // ── Skills ─────────────────────────────────────────────────
        .route("/api/skills", get(skills::list).post(skills::create))
        .route("/api/skills/reload", post(skills::reload))
        .route("/api/skills/categories", get(skills::categories))
        .route(
            "/api/skills/:id",
            get(skills::get).put(skills::update).delete(skills::delete),
        )
        .route("/api/skills/:id/execute", post(skills::execute))
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "HTTP surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ─── Integration tests ───────────────────────────────────────────────────────
