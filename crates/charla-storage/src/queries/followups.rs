// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up queue operations.
//!
//! Same claim/lock/dead-letter discipline as the pending-message buffer,
//! applied to scheduled proactive messages.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::FollowupQueueItem;

/// Enqueue a follow-up. Returns the new item id.
pub async fn enqueue(
    db: &Database,
    session_id: &str,
    config_name: &str,
    scheduled_at: &str,
    now: &str,
) -> Result<i64, CharlaError> {
    let session_id = session_id.to_string();
    let config_name = config_name.to_string();
    let scheduled_at = scheduled_at.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO followup_queue (session_id, config_name, scheduled_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, config_name, scheduled_at, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Pending items whose scheduled time has passed, unclaimed and under the
/// retry ceiling.
pub async fn get_due_items(
    db: &Database,
    now: &str,
    max_retries: u32,
) -> Result<Vec<FollowupQueueItem>, CharlaError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM followup_queue
                 WHERE status = 'pending' AND scheduled_at <= ?1
                   AND processing_started_at IS NULL AND retry_count < ?2
                 ORDER BY scheduled_at ASC",
                FollowupQueueItem::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now, max_retries], FollowupQueueItem::from_row)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row?);
            }
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim one item. Returns `false` if already claimed or no
/// longer pending.
pub async fn claim(db: &Database, id: i64, now: &str) -> Result<bool, CharlaError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let claimed = conn.execute(
                "UPDATE followup_queue SET processing_started_at = ?1
                 WHERE id = ?2 AND status = 'pending' AND processing_started_at IS NULL",
                params![now, id],
            )?;
            Ok(claimed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a claimed item as successfully sent.
pub async fn mark_sent(db: &Database, id: i64) -> Result<(), CharlaError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE followup_queue
                 SET status = 'sent', processing_started_at = NULL
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count a failed attempt: release the claim, record the error, and move to
/// `failed` once the ceiling is reached.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    error: &str,
    max_retries: u32,
) -> Result<(), CharlaError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE followup_queue
                 SET processing_started_at = NULL,
                     retry_count = retry_count + 1,
                     last_error = ?1
                 WHERE id = ?2",
                params![error, id],
            )?;
            tx.execute(
                "UPDATE followup_queue SET status = 'failed'
                 WHERE id = ?1 AND retry_count >= ?2",
                params![id, max_retries],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Cancel all not-yet-sent items for a session (the user re-engaged
/// organically before a follow-up fired). Returns the number cancelled.
pub async fn cancel_pending(db: &Database, session_id: &str) -> Result<usize, CharlaError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let cancelled = conn.execute(
                "UPDATE followup_queue SET status = 'cancelled'
                 WHERE session_id = ?1 AND status = 'pending'",
                params![session_id],
            )?;
            Ok(cancelled)
        })
        .await
        .map_err(map_tr_err)
}

/// Release claims older than the zombie cutoff. Returns the number released.
pub async fn cleanup_stale_locks(db: &Database, zombie_cutoff: &str) -> Result<usize, CharlaError> {
    let zombie_cutoff = zombie_cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let released = conn.execute(
                "UPDATE followup_queue SET processing_started_at = NULL
                 WHERE processing_started_at IS NOT NULL AND processing_started_at <= ?1",
                params![zombie_cutoff],
            )?;
            Ok(released)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one item by id.
pub async fn get_item(db: &Database, id: i64) -> Result<Option<FollowupQueueItem>, CharlaError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM followup_queue WHERE id = ?1",
                FollowupQueueItem::COLUMNS
            );
            let result = conn.query_row(&sql, params![id], FollowupQueueItem::from_row);
            match result {
                Ok(item) => Ok(Some(item)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}
