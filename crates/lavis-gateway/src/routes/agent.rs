// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use lavis_perception::{thumbnail_base64, CaptureOptions};

use crate::state::{internal_error, AppState};

#[derive(Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Deserialize)]
pub struct TaskBody {
    pub goal: String,
}

#[derive(Deserialize)]
pub struct ScreenshotQuery {
    #[serde(default)]
    pub thumbnail: bool,
}

/// POST /api/agent/chat
pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> impl IntoResponse {
    let started = std::time::Instant::now();
    let response = state.orchestrator.chat(&body.message).await;
    Json(json!({
        "success": !response.starts_with('❌'),
        "response": response,
        "duration_ms": started.elapsed().as_millis() as u64,
    }))
}

/// POST /api/agent/task — the reasoning loop with no step cap.
pub async fn task(State(state): State<AppState>, Json(body): Json<TaskBody>) -> impl IntoResponse {
    let started = std::time::Instant::now();
    let response = state.orchestrator.run_task(&body.goal).await;
    Json(json!({
        "success": !response.starts_with('❌'),
        "response": response,
        "duration_ms": started.elapsed().as_millis() as u64,
    }))
}

/// POST /api/agent/stop — cooperative cancel of the in-flight unit of work.
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    let signalled = state.orchestrator.stop();
    Json(json!({
        "status": if signalled { "stopping" } else { "idle" },
    }))
}

/// POST /api/agent/reset — clear memory, allocate a new session.
pub async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.memory.reset_session();
    Json(json!({ "status": "reset", "session": session }))
}

/// GET /api/agent/status
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "available": state.orchestrator.available(),
        "model": state.orchestrator.model_name(),
        "orchestrator_state": state.orchestrator.state(),
    }))
}

/// GET /api/agent/screenshot?thumbnail=bool
pub async fn screenshot(
    State(state): State<AppState>,
    Query(q): Query<ScreenshotQuery>,
) -> impl IntoResponse {
    let captured = match state.capturer.capture(CaptureOptions::default()).await {
        Ok(c) => c,
        Err(e) => return internal_error(e).into_response(),
    };
    let Some(image) = captured.base64.or_else(|| state.capturer.last_base64()) else {
        return internal_error("no frame available").into_response();
    };
    let image = if q.thumbnail {
        match thumbnail_base64(&image, 512) {
            Ok(t) => t,
            Err(e) => return internal_error(e).into_response(),
        }
    } else {
        image
    };
    Json(json!({
        "success": true,
        "image": image,
        "size": image.len(),
    }))
    .into_response()
}

/// GET /api/agent/history
pub async fn history(State(state): State<AppState>) -> impl IntoResponse {
    match state.memory.history(200) {
        Ok(rows) => {
            let count = rows.len();
            Json(json!({ "messages": rows, "count": count })).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

/// DELETE /api/agent/history
pub async fn clear_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.memory.clear_history() {
        Ok(n) => Json(json!({ "cleared": n })).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
