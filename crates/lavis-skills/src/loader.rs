// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Disk-backed skill loading.
//!
//! Skills live at `<root>/<id>/SKILL.md`.  The loader rebuilds the in-memory
//! set on every `reload()`; a background task polls on an interval so edits
//! on disk appear without a restart.  Use counts survive reloads — a file
//! edit must not reset usage statistics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::SkillError;
use crate::frontmatter::{self, Frontmatter};
use crate::types::Skill;

pub struct SkillLoader {
    root: PathBuf,
    skills: RwLock<HashMap<String, Skill>>,
}

impl SkillLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skills: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the root directory and rebuild the skill set.
    ///
    /// Individual bad packages are skipped with a warning; they never poison
    /// the rest of the set.  Returns the number of loaded skills.
    pub fn reload(&self) -> Result<usize, SkillError> {
        let mut fresh: HashMap<String, Skill> = HashMap::new();
        let mut seen_names: HashMap<String, String> = HashMap::new();

        if self.root.exists() {
            for entry in std::fs::read_dir(&self.root)? {
                let entry = entry?;
                let dir = entry.path();
                if !dir.is_dir() {
                    continue;
                }
                let id = entry.file_name().to_string_lossy().to_string();
                let md_path = dir.join("SKILL.md");
                if !md_path.exists() {
                    continue;
                }
                match load_one(&id, &md_path) {
                    Ok(skill) => {
                        if let Some(other) = seen_names.get(&skill.name) {
                            warn!(
                                skill_id = %id,
                                name = %skill.name,
                                conflicts_with = %other,
                                "duplicate skill name; skipping"
                            );
                            continue;
                        }
                        seen_names.insert(skill.name.clone(), id.clone());
                        fresh.insert(id, skill);
                    }
                    Err(e) => {
                        warn!(skill_id = %id, error = %e, "skipping invalid skill package");
                    }
                }
            }
        }

        // Carry usage statistics across the rebuild.
        {
            let old = self.skills.read().unwrap();
            for (id, skill) in fresh.iter_mut() {
                if let Some(prev) = old.get(id) {
                    skill.use_count = prev.use_count;
                    skill.last_used = prev.last_used;
                    skill.enabled = prev.enabled;
                }
            }
        }

        let count = fresh.len();
        *self.skills.write().unwrap() = fresh;
        debug!(count, root = %self.root.display(), "skills reloaded");
        Ok(count)
    }

    /// All loaded skills, sorted by name.
    pub fn list(&self) -> Vec<Skill> {
        let mut all: Vec<Skill> = self.skills.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Look up by id, falling back to name.
    pub fn get(&self, id_or_name: &str) -> Option<Skill> {
        let skills = self.skills.read().unwrap();
        skills
            .get(id_or_name)
            .or_else(|| skills.values().find(|s| s.name == id_or_name))
            .cloned()
    }

    /// Distinct categories across the loaded set, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<String> = self
            .skills
            .read()
            .unwrap()
            .values()
            .map(|s| s.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Write a new skill package to disk and load it.
    pub fn create(&self, id: &str, fm: Frontmatter, body: &str) -> Result<Skill, SkillError> {
        if self.skills.read().unwrap().contains_key(id) {
            return Err(SkillError::Parse(format!("skill '{id}' already exists")));
        }
        let dir = self.root.join(id);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("SKILL.md");
        std::fs::write(&path, frontmatter::serialize(&fm, body))?;
        let skill = load_one(id, &path)?;
        info!(skill_id = %id, name = %skill.name, "skill created");
        self.skills
            .write()
            .unwrap()
            .insert(id.to_string(), skill.clone());
        Ok(skill)
    }

    /// Rewrite an existing skill package on disk.
    pub fn update(&self, id: &str, fm: Frontmatter, body: &str) -> Result<Skill, SkillError> {
        let existing = self
            .get(id)
            .ok_or_else(|| SkillError::NotFound(id.to_string()))?;
        std::fs::write(&existing.path, frontmatter::serialize(&fm, body))?;
        let mut skill = load_one(&existing.id, &existing.path)?;
        skill.use_count = existing.use_count;
        skill.last_used = existing.last_used;
        info!(skill_id = %existing.id, "skill updated");
        self.skills
            .write()
            .unwrap()
            .insert(existing.id.clone(), skill.clone());
        Ok(skill)
    }

    /// Remove a skill package from disk and from the active set.
    pub fn delete(&self, id: &str) -> Result<(), SkillError> {
        let existing = self
            .get(id)
            .ok_or_else(|| SkillError::NotFound(id.to_string()))?;
        if let Some(dir) = existing.path.parent() {
            std::fs::remove_dir_all(dir)?;
        }
        self.skills.write().unwrap().remove(&existing.id);
        info!(skill_id = %existing.id, "skill deleted");
        Ok(())
    }

    /// Record one use of a skill.
    pub fn mark_used(&self, id: &str, at: DateTime<Utc>) {
        if let Some(skill) = self.skills.write().unwrap().get_mut(id) {
            skill.use_count += 1;
            skill.last_used = Some(at);
        }
    }

}

fn load_one(id: &str, md_path: &Path) -> Result<Skill, SkillError> {
    let text = std::fs::read_to_string(md_path)?;
    let (fm, body) = frontmatter::parse(&text)?;
    Ok(Skill::from_frontmatter(id, fm, body, md_path.to_path_buf()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, id: &str, name: &str, command: &str, body: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ncommand: {command}\n---\n\n{body}\n"),
        )
        .unwrap();
    }

    #[test]
    fn reload_discovers_packages() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "sign-in", "sign-in", "agent:log in", "Use SSO.");
        write_skill(tmp.path(), "backup", "backup", "shell:rsync -a", "Nightly.");

        let loader = SkillLoader::new(tmp.path());
        assert_eq!(loader.reload().unwrap(), 2);
        let names: Vec<String> = loader.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["backup", "sign-in"]);
    }

    #[test]
    fn invalid_package_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "good", "good", "shell:true", "ok");
        let bad = tmp.path().join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join("SKILL.md"), "no frontmatter here").unwrap();

        let loader = SkillLoader::new(tmp.path());
        assert_eq!(loader.reload().unwrap(), 1);
        assert!(loader.get("good").is_some());
        assert!(loader.get("bad").is_none());
    }

    #[test]
    fn duplicate_names_keep_first_seen() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "a", "same", "shell:true", "x");
        write_skill(tmp.path(), "b", "same", "shell:true", "y");
        let loader = SkillLoader::new(tmp.path());
        assert_eq!(loader.reload().unwrap(), 1);
    }

    #[test]
    fn missing_root_is_empty_not_error() {
        let loader = SkillLoader::new("/tmp/lavis-no-such-skills-root-xyz");
        assert_eq!(loader.reload().unwrap(), 0);
    }

    #[test]
    fn get_resolves_id_and_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "dir-id", "pretty-name", "shell:true", "b");
        let loader = SkillLoader::new(tmp.path());
        loader.reload().unwrap();
        assert!(loader.get("dir-id").is_some());
        assert!(loader.get("pretty-name").is_some());
        assert!(loader.get("nope").is_none());
    }

    #[test]
    fn reload_preserves_use_counts() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "s", "s", "shell:true", "b");
        let loader = SkillLoader::new(tmp.path());
        loader.reload().unwrap();
        loader.mark_used("s", Utc::now());
        loader.reload().unwrap();
        assert_eq!(loader.get("s").unwrap().use_count, 1);
        assert!(loader.get("s").unwrap().last_used.is_some());
    }

    #[test]
    fn create_update_delete_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = SkillLoader::new(tmp.path());
        loader.reload().unwrap();

        let fm = Frontmatter {
            name: "new-skill".into(),
            command: "shell:echo hi".into(),
            category: "demo".into(),
            ..Default::default()
        };
        let created = loader.create("new-skill", fm.clone(), "Body text.").unwrap();
        assert!(created.path.exists());
        assert_eq!(loader.categories(), vec!["demo"]);

        let mut fm2 = fm.clone();
        fm2.description = "updated".into();
        let updated = loader.update("new-skill", fm2, "New body.").unwrap();
        assert_eq!(updated.description, "updated");
        assert!(updated.body.contains("New body."));

        loader.delete("new-skill").unwrap();
        assert!(loader.get("new-skill").is_none());
        assert!(!tmp.path().join("new-skill").exists());
    }

    #[test]
    fn create_rejects_existing_id() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "dup", "dup", "shell:true", "b");
        let loader = SkillLoader::new(tmp.path());
        loader.reload().unwrap();
        let fm = Frontmatter {
            name: "other".into(),
            command: "shell:true".into(),
            ..Default::default()
        };
        assert!(loader.create("dup", fm, "b").is_err());
    }

    #[test]
    fn hot_edit_appears_after_reload() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "s", "s", "shell:true", "old body");
        let loader = SkillLoader::new(tmp.path());
        loader.reload().unwrap();
        assert!(loader.get("s").unwrap().body.contains("old body"));

        write_skill(tmp.path(), "s", "s", "shell:true", "new body");
        loader.reload().unwrap();
        assert!(loader.get("s").unwrap().body.contains("new body"));
    }
}
