// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session CRUD operations.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Session;

/// Create a new session.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), CharlaError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions
                     (id, contact_id, channel, channel_id, user_id, group_hash, flow_name,
                      current_state, previous_state, context, escalated, escalation_reason,
                      status, followup_index, last_message_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    session.id,
                    session.contact_id,
                    session.channel,
                    session.channel_id,
                    session.user_id,
                    session.group_hash,
                    session.flow_name,
                    session.current_state,
                    session.previous_state,
                    session.context,
                    session.escalated as i64,
                    session.escalation_reason,
                    session.status,
                    session.followup_index,
                    session.last_message_at,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by its group hash (the buffer's grouping key).
pub async fn get_by_group_hash(
    db: &Database,
    group_hash: &str,
) -> Result<Option<Session>, CharlaError> {
    let group_hash = group_hash.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM sessions WHERE group_hash = ?1",
                Session::COLUMNS
            );
            let result = conn.query_row(&sql, params![group_hash], Session::from_row);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Get a session by id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, CharlaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {} FROM sessions WHERE id = ?1", Session::COLUMNS);
            let result = conn.query_row(&sql, params![id], Session::from_row);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Persist the engine's post-processing state mutations: state names,
/// context map, follow-up cursor, and the updated timestamps.
pub async fn update_after_processing(db: &Database, session: &Session) -> Result<(), CharlaError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET current_state = ?1, previous_state = ?2, context = ?3,
                     escalated = ?4, escalation_reason = ?5, followup_index = ?6,
                     last_message_at = ?7, updated_at = ?8
                 WHERE id = ?9",
                params![
                    session.current_state,
                    session.previous_state,
                    session.context,
                    session.escalated as i64,
                    session.escalation_reason,
                    session.followup_index,
                    session.last_message_at,
                    session.updated_at,
                    session.id,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update only the last-message timestamp (used by the total-failure path,
/// which must apply no state/context mutation).
pub async fn touch_last_message(
    db: &Database,
    id: &str,
    last_message_at: &str,
) -> Result<(), CharlaError> {
    let id = id.to_string();
    let last_message_at = last_message_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET last_message_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![last_message_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Advance the follow-up sequence cursor after a follow-up is sent.
pub async fn set_followup_index(
    db: &Database,
    id: &str,
    index: i64,
    now: &str,
) -> Result<(), CharlaError> {
    let id = id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET followup_index = ?1, updated_at = ?2 WHERE id = ?3",
                params![index, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a session escalated with a reason.
pub async fn set_escalated(
    db: &Database,
    id: &str,
    reason: &str,
    now: &str,
) -> Result<(), CharlaError> {
    let id = id.to_string();
    let reason = reason.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET escalated = 1, escalation_reason = ?1, last_message_at = ?2, updated_at = ?2
                 WHERE id = ?3",
                params![reason, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Clear the escalation flag (auto-resume after the hold window).
pub async fn clear_escalation(db: &Database, id: &str, now: &str) -> Result<(), CharlaError> {
    let id = id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET escalated = 0, escalation_reason = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
