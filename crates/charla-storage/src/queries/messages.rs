// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::StoredMessage;

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &StoredMessage) -> Result<(), CharlaError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, token_count, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id,
                    msg.session_id,
                    msg.role,
                    msg.content,
                    msg.token_count,
                    msg.metadata,
                    msg.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent `limit` messages of a session, returned in
/// chronological order.
pub async fn get_recent_messages(
    db: &Database,
    session_id: &str,
    limit: u32,
) -> Result<Vec<StoredMessage>, CharlaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            // Take the newest `limit` rows, then flip back to chronological.
            // rowid breaks same-millisecond ties by insertion order.
            let sql = format!(
                "SELECT {} FROM (
                     SELECT {}, rowid AS rid FROM messages WHERE session_id = ?1
                     ORDER BY created_at DESC, rid DESC LIMIT ?2
                 ) ORDER BY created_at ASC, rid ASC",
                StoredMessage::COLUMNS,
                StoredMessage::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id, limit], StoredMessage::from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
