// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! User skills for lavis.
//!
//! A skill is a markdown package at `<root>/<id>/SKILL.md`: a small
//! `---`-fenced frontmatter (name, command, and optional metadata) followed
//! by a free-form knowledge body.  Invoking a skill injects its knowledge
//! into exactly one subsequent reasoning invocation and runs its command.

pub mod frontmatter;

mod error;
mod loader;
mod service;
mod types;

pub use error::SkillError;
pub use frontmatter::Frontmatter;
pub use loader::SkillLoader;
pub use service::{SkillService, SkillTool};
pub use types::{Skill, SkillContext};
