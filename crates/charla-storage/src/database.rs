// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes: the
//! claim operations rely on single-writer atomicity.

use charla_core::CharlaError;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Idempotent schema, applied at open.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    id              TEXT PRIMARY KEY,
    channel         TEXT NOT NULL,
    channel_user_id TEXT NOT NULL,
    name            TEXT,
    language        TEXT,
    registered      INTEGER NOT NULL DEFAULT 0,
    deposit_confirmed INTEGER NOT NULL DEFAULT 0,
    lifetime_value  REAL NOT NULL DEFAULT 0,
    attribution     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (channel, channel_user_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id               TEXT PRIMARY KEY,
    contact_id       TEXT NOT NULL REFERENCES contacts(id),
    channel          TEXT NOT NULL,
    channel_id       TEXT NOT NULL,
    user_id          TEXT NOT NULL,
    group_hash       TEXT NOT NULL UNIQUE,
    flow_name        TEXT NOT NULL,
    current_state    TEXT NOT NULL,
    previous_state   TEXT,
    context          TEXT,
    escalated        INTEGER NOT NULL DEFAULT 0,
    escalation_reason TEXT,
    status           TEXT NOT NULL DEFAULT 'active',
    followup_index   INTEGER NOT NULL DEFAULT -1,
    last_message_at  TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (channel, channel_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES sessions(id),
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    token_count INTEGER,
    metadata    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);

CREATE TABLE IF NOT EXISTS pending_messages (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    group_hash            TEXT NOT NULL,
    payload               TEXT NOT NULL,
    received_at           TEXT NOT NULL,
    scheduled_process_at  TEXT NOT NULL,
    retry_count           INTEGER NOT NULL DEFAULT 0,
    last_error            TEXT,
    processing_started_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_pending_group ON pending_messages(group_hash);
CREATE INDEX IF NOT EXISTS idx_pending_mature
    ON pending_messages(scheduled_process_at, processing_started_at, retry_count);

CREATE TABLE IF NOT EXISTS knowledge (
    id        TEXT PRIMARY KEY,
    category  TEXT NOT NULL,
    title     TEXT NOT NULL,
    content   TEXT NOT NULL,
    embedding TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_knowledge_category ON knowledge(category);

CREATE TABLE IF NOT EXISTS examples (
    id            TEXT PRIMARY KEY,
    scenario      TEXT NOT NULL,
    category      TEXT NOT NULL,
    outcome       TEXT NOT NULL,
    primary_state TEXT NOT NULL,
    state_flow    TEXT NOT NULL,
    messages      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_examples_state ON examples(primary_state, category);

CREATE TABLE IF NOT EXISTS flows (
    name       TEXT NOT NULL,
    version    INTEGER NOT NULL,
    active     INTEGER NOT NULL DEFAULT 0,
    definition TEXT NOT NULL,
    PRIMARY KEY (name, version)
);

CREATE TABLE IF NOT EXISTS followup_configs (
    name       TEXT PRIMARY KEY,
    definition TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS followup_queue (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id            TEXT NOT NULL REFERENCES sessions(id),
    config_name           TEXT NOT NULL,
    scheduled_at          TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'pending',
    last_error            TEXT,
    retry_count           INTEGER NOT NULL DEFAULT 0,
    processing_started_at TEXT,
    created_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_followup_due ON followup_queue(status, scheduled_at);
"#;

/// Handle to the single serialized SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies PRAGMAs and the
    /// idempotent schema.
    pub async fn open(path: &str) -> Result<Self, CharlaError> {
        let conn = Connection::open(path).await.map_err(|e| map_tr_err(e.into()))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Opens an in-memory database. Test-only convenience.
    pub async fn open_in_memory() -> Result<Self, CharlaError> {
        let conn = Connection::open(":memory:").await.map_err(|e| map_tr_err(e.into()))?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }

    /// Returns the underlying serialized connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the connection, flushing pending writes.
    pub async fn close(&self) -> Result<(), CharlaError> {
        self.conn.clone().close().await.map_err(map_tr_err)
    }
}

/// Maps a tokio-rusqlite error into the storage error variant.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> CharlaError {
    CharlaError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let count: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('contacts','sessions','messages','pending_messages',
                                  'knowledge','examples','flows','followup_configs',
                                  'followup_queue')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(count, 9);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();

        // Re-opening an existing database must not fail on existing tables.
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }
}
