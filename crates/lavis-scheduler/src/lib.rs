// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Cron-driven recurring tasks for lavis.
//!
//! Tasks carry the shared command grammar (`agent:<goal>` re-enters the
//! reasoning loop, `shell:<cmd>` spawns a child, bare defaults to shell),
//! persist in SQLite alongside an append-only run log, and execute
//! serialized per task id.

mod db;
mod engine;
mod error;
mod types;

pub use db::TaskStore;
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use types::{NewTask, RunStatus, ScheduledTask, TaskPatch, TaskRunLog};
