// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! SQLite persistence for tasks and their run logs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{
    error::{Result, SchedulerError},
    types::{RunStatus, ScheduledTask, TaskRunLog},
};

/// Initialise the scheduler schema (idempotent), with an index on task id so
/// run-log listing stays efficient with long histories.
fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT    NOT NULL PRIMARY KEY,
            name            TEXT    NOT NULL,
            description     TEXT    NOT NULL DEFAULT '',
            cron            TEXT    NOT NULL,
            command         TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            last_run        TEXT,
            last_run_status TEXT,
            run_count       INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_runs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     TEXT    NOT NULL,
            started_at  TEXT    NOT NULL,
            ended_at    TEXT    NOT NULL,
            status      TEXT    NOT NULL,
            output      TEXT,
            error       TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_task_runs_task ON task_runs (task_id, id);
        ",
    )?;
    Ok(())
}

#[derive(Clone)]
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn insert(&self, task: &ScheduledTask) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO tasks
             (id, name, description, cron, command, enabled,
              created_at, updated_at, last_run, last_run_status, run_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                task.id,
                task.name,
                task.description,
                task.cron,
                task.command,
                task.enabled as i64,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.last_run.map(|t| t.to_rfc3339()),
                task.last_run_status.map(|s| s.to_string()),
                task.run_count as i64,
            ],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, cron, command, enabled,
                    created_at, updated_at, last_run, last_run_status, run_count
             FROM tasks ORDER BY created_at",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tasks)
    }

    pub fn get(&self, id: &str) -> Result<ScheduledTask> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, cron, command, enabled,
                    created_at, updated_at, last_run, last_run_status, run_count
             FROM tasks WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_task)?;
        rows.next()
            .transpose()?
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })
    }

    /// Persist mutable fields of an updated task row.
    pub fn update(&self, task: &ScheduledTask) -> Result<()> {
        let n = self.conn.lock().unwrap().execute(
            "UPDATE tasks SET name=?2, description=?3, cron=?4, command=?5,
                              enabled=?6, updated_at=?7, last_run=?8,
                              last_run_status=?9, run_count=?10
             WHERE id = ?1",
            rusqlite::params![
                task.id,
                task.name,
                task.description,
                task.cron,
                task.command,
                task.enabled as i64,
                task.updated_at.to_rfc3339(),
                task.last_run.map(|t| t.to_rfc3339()),
                task.last_run_status.map(|s| s.to_string()),
                task.run_count as i64,
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound {
                id: task.id.clone(),
            });
        }
        Ok(())
    }

    /// Delete a task and cascade its run logs.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM task_runs WHERE task_id = ?1", [id])?;
        let n = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn insert_run(
        &self,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        status: RunStatus,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<i64> {
        let duration_ms = (ended_at - started_at).num_milliseconds();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_runs
             (task_id, started_at, ended_at, status, output, error, duration_ms)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            rusqlite::params![
                task_id,
                started_at.to_rfc3339(),
                ended_at.to_rfc3339(),
                status.to_string(),
                output,
                error,
                duration_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Run logs for one task, newest first.
    pub fn list_runs(&self, task_id: &str, limit: usize) -> Result<Vec<TaskRunLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, started_at, ended_at, status, output, error, duration_ms
             FROM task_runs WHERE task_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(rusqlite::params![task_id, limit as i64], |row| {
                Ok(TaskRunLog {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    started_at: parse_ts(row.get::<_, String>(2)?),
                    ended_at: parse_ts(row.get::<_, String>(3)?),
                    status: row
                        .get::<_, String>(4)?
                        .parse()
                        .unwrap_or(RunStatus::Failed),
                    output: row.get(5)?,
                    error: row.get(6)?,
                    duration_ms: row.get(7)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(runs)
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let last_run: Option<String> = row.get(8)?;
    let last_status: Option<String> = row.get(9)?;
    Ok(ScheduledTask {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        cron: row.get(3)?,
        command: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(row.get::<_, String>(6)?),
        updated_at: parse_ts(row.get::<_, String>(7)?),
        last_run: last_run.map(parse_ts),
        last_run_status: last_status.and_then(|s| s.parse().ok()),
        run_count: row.get::<_, i64>(10)? as u64,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
