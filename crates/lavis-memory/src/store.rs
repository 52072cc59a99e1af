// Copyright (c) 2025-2026 Lavis Contributors
//
// SPDX-License-Identifier: MIT
//! Durable rows for sessions and messages.
//!
//! SQLite-backed; the connection sits behind a mutex and every call is a
//! short transaction.  Persistence is best-effort from the manager's point
//! of view — a failed write degrades session statistics, not correctness.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::message::{MessageBody, StoredMessage};

/// One message row as surfaced over the history API.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub kind: String,
    pub text: String,
    pub image_id: Option<String>,
    pub tool_calls: Option<serde_json::Value>,
    pub tool_result_id: Option<String>,
    pub token_estimate: i64,
    pub turn_id: String,
    pub turn_pos: i64,
    pub is_compressed: bool,
    pub created_at: String,
}

pub struct PersistentStore {
    conn: Mutex<Connection>,
}

impl PersistentStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the session row if it does not exist yet.
    pub fn ensure_session(&self, key: &str) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().unwrap().execute(
            "INSERT INTO sessions (key, created_at, updated_at, message_count, token_estimate, metadata)
             VALUES (?1, ?2, ?2, 0, 0, '{}')
             ON CONFLICT(key) DO NOTHING",
            rusqlite::params![key, now],
        )?;
        Ok(())
    }

    /// Persist one message and bump the session counters.
    pub fn record_message(&self, session_key: &str, msg: &StoredMessage) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        let (text, tool_calls, tool_result_id) = project_body(&msg.body);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages
             (session_key, kind, text, image_id, tool_calls, tool_result_id,
              token_estimate, turn_id, turn_pos, is_compressed, created_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                session_key,
                msg.kind(),
                text,
                msg.image_id(),
                tool_calls,
                tool_result_id,
                msg.token_estimate as i64,
                msg.turn_id,
                msg.turn_pos as i64,
                msg.is_compressed as i64,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE sessions SET message_count = message_count + 1,
                                 token_estimate = token_estimate + ?2,
                                 updated_at = ?3
             WHERE key = ?1",
            rusqlite::params![session_key, msg.token_estimate as i64, now],
        )?;
        Ok(id)
    }

    /// Mark a turn's image rows compressed after compaction.
    pub fn mark_compressed(&self, turn_id: &str, image_ids: &[String]) -> anyhow::Result<usize> {
        if image_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let mut updated = 0;
        for image_id in image_ids {
            updated += conn.execute(
                "UPDATE messages SET is_compressed = 1 WHERE turn_id = ?1 AND image_id = ?2",
                rusqlite::params![turn_id, image_id],
            )?;
        }
        Ok(updated)
    }

    /// Most recent messages for a session, oldest first.
    pub fn history(&self, session_key: &str, limit: usize) -> anyhow::Result<Vec<MessageRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, text, image_id, tool_calls, tool_result_id,
                    token_estimate, turn_id, turn_pos, is_compressed, created_at
             FROM messages WHERE session_key = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows: Vec<MessageRow> = stmt
            .query_map(rusqlite::params![session_key, limit as i64], |row| {
                let tool_calls: Option<String> = row.get(4)?;
                Ok(MessageRow {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    text: row.get(2)?,
                    image_id: row.get(3)?,
                    tool_calls: tool_calls.and_then(|s| serde_json::from_str(&s).ok()),
                    tool_result_id: row.get(5)?,
                    token_estimate: row.get(6)?,
                    turn_id: row.get(7)?,
                    turn_pos: row.get(8)?,
                    is_compressed: row.get::<_, i64>(9)? != 0,
                    created_at: row.get(10)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    pub fn clear_history(&self, session_key: &str) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM messages WHERE session_key = ?1",
            rusqlite::params![session_key],
        )?;
        conn.execute(
            "UPDATE sessions SET message_count = 0, token_estimate = 0 WHERE key = ?1",
            rusqlite::params![session_key],
        )?;
        Ok(n)
    }

    /// `(message_count, token_estimate)` for a session, if it exists.
    pub fn session_stats(&self, session_key: &str) -> anyhow::Result<Option<(u64, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT message_count, token_estimate FROM sessions WHERE key = ?1")?;
        let mut rows = stmt.query(rusqlite::params![session_key])?;
        match rows.next()? {
            Some(row) => Ok(Some((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, i64>(1)? as u64,
            ))),
            None => Ok(None),
        }
    }
}

fn init_db(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            key            TEXT    NOT NULL PRIMARY KEY,
            created_at     TEXT    NOT NULL,
            updated_at     TEXT    NOT NULL,
            message_count  INTEGER NOT NULL DEFAULT 0,
            token_estimate INTEGER NOT NULL DEFAULT 0,
            metadata       TEXT    NOT NULL DEFAULT '{}'
        ) STRICT;

        CREATE TABLE IF NOT EXISTS messages (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            session_key    TEXT    NOT NULL,
            kind           TEXT    NOT NULL,
            text           TEXT    NOT NULL DEFAULT '',
            image_id       TEXT,
            tool_calls     TEXT,
            tool_result_id TEXT,
            token_estimate INTEGER NOT NULL DEFAULT 0,
            turn_id        TEXT    NOT NULL,
            turn_pos       INTEGER NOT NULL DEFAULT 0,
            is_compressed  INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_key, id);
        CREATE INDEX IF NOT EXISTS idx_messages_turn ON messages (turn_id);
        ",
    )?;
    Ok(())
}

/// Project a body variant onto `(text, tool_calls_json, tool_result_id)`.
fn project_body(body: &MessageBody) -> (String, Option<String>, Option<String>) {
    match body {
        MessageBody::UserText { text }
        | MessageBody::UserMultimodal { text, .. }
        | MessageBody::AssistantText { text }
        | MessageBody::SystemObservation { text, .. } => (text.clone(), None, None),
        MessageBody::AssistantToolCalls { requests } => (
            String::new(),
            serde_json::to_string(requests).ok(),
            None,
        ),
        MessageBody::ToolResult {
            request_id,
            content,
        } => (content.clone(), None, Some(request_id.clone())),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
