// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("skill parse error: {0}")]
    Parse(String),

    #[error("skill execution failed: {0}")]
    Exec(String),

    #[error("skill '{0}' is disabled")]
    Disabled(String),

    #[error("skill io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent runner not wired; cannot execute agent: commands")]
    NoRunner,
}
