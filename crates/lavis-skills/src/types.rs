// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::frontmatter::Frontmatter;

/// A loaded skill package.
///
/// The `id` is the directory name under the skills root; the frontmatter's
/// `name` must be unique across the loaded set (duplicates are skipped at
/// load time).
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: String,
    pub author: String,
    /// Command grammar string: `agent:<goal>`, `shell:<cmd>`, or bare shell.
    pub command: String,
    /// Knowledge body (everything after the frontmatter fence).
    pub body: String,
    pub enabled: bool,
    /// Where the package came from ("local" for disk scans).
    pub install_source: String,
    /// Path to the SKILL.md file on disk.
    pub path: PathBuf,
    pub last_used: Option<DateTime<Utc>>,
    pub use_count: u64,
}

impl Skill {
    pub fn from_frontmatter(id: &str, fm: Frontmatter, body: String, path: PathBuf) -> Self {
        Self {
            id: id.to_string(),
            name: fm.name,
            description: fm.description,
            category: fm.category,
            version: fm.version,
            author: fm.author,
            command: fm.command,
            body,
            enabled: true,
            install_source: "local".into(),
            path,
            last_used: None,
            use_count: 0,
        }
    }

    pub fn frontmatter(&self) -> Frontmatter {
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

/// Knowledge injected into exactly one subsequent reasoning invocation.
#[derive(Debug, Clone)]
pub struct SkillContext {
    pub skill_name: String,
    pub knowledge: String,
}
