// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use lavis_scheduler::{NewTask, SchedulerError, TaskPatch};

use crate::state::{bad_request, internal_error, not_found, AppState};

fn map_err(e: SchedulerError) -> axum::response::Response {
    match e {
        SchedulerError::TaskNotFound { .. } => not_found("task").into_response(),
        SchedulerError::InvalidCron { .. } => bad_request(e).into_response(),
        SchedulerError::Db(_) => internal_error(e).into_response(),
    }
}

/// GET /api/scheduler/tasks
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.list() {
        Ok(tasks) => {
            let count = tasks.len();
            Json(json!({ "tasks": tasks, "count": count })).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// POST /api/scheduler/tasks
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewTask>,
) -> impl IntoResponse {
    match state.scheduler.create(body) {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => map_err(e),
    }
}

/// GET /api/scheduler/tasks/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.get(&id) {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => map_err(e),
    }
}

/// PUT /api/scheduler/tasks/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> impl IntoResponse {
    match state.scheduler.update(&id, patch) {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => map_err(e),
    }
}

/// DELETE /api/scheduler/tasks/:id — cascades run logs.
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.delete(&id) {
        Ok(()) => Json(json!({ "deleted": id })).into_response(),
        Err(e) => map_err(e),
    }
}

/// POST /api/scheduler/tasks/:id/pause
pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.pause(&id) {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => map_err(e),
    }
}

/// POST /api/scheduler/tasks/:id/resume
pub async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.resume(&id) {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => map_err(e),
    }
}

/// POST /api/scheduler/tasks/:id/run — force one immediate execution.
pub async fn run_now(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.scheduler.clone().run_now(&id) {
        Ok(()) => Json(json!({ "status": "started", "task_id": id })).into_response(),
        Err(e) => map_err(e),
    }
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/scheduler/tasks/:id/history
pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.scheduler.logs(&id, q.limit) {
        Ok(runs) => {
            let count = runs.len();
            Json(json!({ "runs": runs, "count": count })).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// POST /api/scheduler/start
pub async fn start(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.clone().start();
    Json(json!({ "status": "started" }))
}

/// POST /api/scheduler/stop
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.stop();
    Json(json!({ "status": "stopped" }))
}
