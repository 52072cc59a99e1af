// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use lavis_skills::{Frontmatter, SkillError};

use crate::state::{bad_request, internal_error, not_found, AppState};

fn map_err(e: SkillError) -> axum::response::Response {
    match e {
        SkillError::NotFound(_) => not_found("skill").into_response(),
        SkillError::Parse(_) | SkillError::Disabled(_) | SkillError::NoRunner => {
            bad_request(e).into_response()
        }
        SkillError::Exec(_) | SkillError::Io(_) => internal_error(e).into_response(),
    }
}

/// Skill payloads never ship the knowledge body to list views; `get`
/// returns it in full.
fn skill_summary(s: &lavis_skills::Skill) -> serde_json::Value {
    json!({
        "id": s.id,
        "name": s.name,
        "description": s.description,
        "category": s.category,
        "version": s.version,
        "author": s.author,
        "command": s.command,
        "enabled": s.enabled,
        "install_source": s.install_source,
        "last_used": s.last_used,
        "use_count": s.use_count,
    })
}

/// GET /api/skills
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    let skills = state.skills.loader().list();
    Json(json!({
        "skills": skills.iter().map(skill_summary).collect::<Vec<_>>(),
        "count": skills.len(),
    }))
}

/// GET /api/skills/:id
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.skills.loader().get(&id) {
        Some(skill) => {
            let mut payload = skill_summary(&skill);
            payload["body"] = json!(skill.body);
            Json(payload).into_response()
        }
        None => not_found("skill").into_response(),
    }
}

#[derive(Deserialize)]
pub struct SkillBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    pub command: String,
    #[serde(default)]
    pub body: String,
}

impl SkillBody {
    fn frontmatter(&self) -> Frontmatter {
        Frontmatter {
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            version: self.version.clone(),
            author: self.author.clone(),
            command: self.command.clone(),
        }
    }
}

/// POST /api/skills — create a package on disk.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<SkillBody>,
) -> impl IntoResponse {
    let id = slug(&body.name);
    match state.skills.loader().create(&id, body.frontmatter(), &body.body) {
        Ok(skill) => {
            state.refresh_skill_tools();
            Json(skill_summary(&skill)).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// PUT /api/skills/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SkillBody>,
) -> impl IntoResponse {
    match state.skills.loader().update(&id, body.frontmatter(), &body.body) {
        Ok(skill) => {
            state.refresh_skill_tools();
            Json(skill_summary(&skill)).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// DELETE /api/skills/:id
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.skills.loader().delete(&id) {
        Ok(()) => {
            state.refresh_skill_tools();
            Json(json!({ "deleted": id })).into_response()
        }
        Err(e) => map_err(e),
    }
}

#[derive(Deserialize, Default)]
pub struct ExecuteBody {
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// POST /api/skills/:id/execute
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ExecuteBody>>,
) -> impl IntoResponse {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    match state.skills.execute(&id, &body.params).await {
        Ok(output) => Json(json!({ "success": true, "output": output })).into_response(),
        Err(e @ SkillError::NotFound(_)) => map_err(e),
        Err(e) => Json(json!({ "success": false, "output": e.to_string() })).into_response(),
    }
}

/// POST /api/skills/reload
pub async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    match state.skills.loader().reload() {
        Ok(count) => {
            state.refresh_skill_tools();
            Json(json!({ "reloaded": true, "skills_count": count })).into_response()
        }
        Err(e) => map_err(e),
    }
}

/// GET /api/skills/categories
pub async fn categories(State(state): State<AppState>) -> impl IntoResponse {
    let categories = state.skills.loader().categories();
    Json(json!({ "categories": categories }))
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalizes_names() {
        assert_eq!(slug("Sign In"), "sign-in");
        assert_eq!(slug("backup!"), "backup");
    }
}
