// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Content-addressed blob store for offloaded screenshot bytes.
//!
//! Entries live at `<root>/<id[..2]>/<id[2..4]>/<id>` — the two-level prefix
//! split keeps any single directory from ballooning.  Writes go through a
//! temp file + rename so concurrent writers of the same id race benignly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

pub struct ColdStorage {
    root: PathBuf,
}

impl ColdStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, image_id: &str) -> PathBuf {
        // Short ids (never produced by the capturer, but tolerated) land in
        // a flat "xx" bucket rather than panicking on slicing.
        let (a, b) = if image_id.len() >= 4 {
            (&image_id[..2], &image_id[2..4])
        } else {
            ("xx", "xx")
        };
        self.root.join(a).join(b).join(image_id)
    }

    /// Write bytes for `image_id`.  Idempotent: an existing entry wins and
    /// the new write is dropped.
    pub fn archive(&self, image_id: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(image_id);
        if path.exists() {
            return Ok(());
        }
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cold path has no parent"))?;
        std::fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".{image_id}.tmp-{}", std::process::id()));
        std::fs::write(&tmp, bytes)?;
        // rename() is atomic within a filesystem; a concurrent writer of the
        // same id produces identical content, so last-rename-wins is fine.
        std::fs::rename(&tmp, &path)?;
        debug!(image_id, bytes = bytes.len(), "archived to cold storage");
        Ok(())
    }

    /// Bytes for `image_id`, or `None` when absent or unreadable.
    pub fn retrieve(&self, image_id: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path_for(image_id)).ok()
    }

    pub fn contains(&self, image_id: &str) -> bool {
        self.path_for(image_id).exists()
    }

    /// Prune entries older than `retention_days`.  Returns the number of
    /// entries removed.  A missing entry degrades a later retrieval, never
    /// the correctness of the active turn — prune errors are logged and
    /// skipped.
    pub fn cleanup(&self, retention_days: u32) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(retention_days as u64 * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for entry in walk_files(&self.root) {
            let old = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|t| t < cutoff)
                .unwrap_or(false);
            if old {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %entry.path().display(), error = %e, "cold prune failed"),
                }
            }
        }
        removed
    }
}

fn walk_files(root: &Path) -> Vec<std::fs::DirEntry> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(entry);
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
