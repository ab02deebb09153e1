// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending-message buffer operations: debounce coalescing, atomic claims,
//! retry/dead-letter accounting, and zombie-lock release.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::PendingMessage;

/// The single definition of "actionable work". `get_mature_sessions` and
/// `has_pending_messages` must share this predicate verbatim: a past
/// divergence between the two caused runaway self-re-invocation.
///
/// Bind order: ?1 = now, ?2 = max_retries.
const MATURE_PREDICATE: &str =
    "scheduled_process_at <= ?1 AND processing_started_at IS NULL AND retry_count < ?2";

/// Insert a new pending message and push the debounce deadline forward for
/// every still-unclaimed message under the same group.
///
/// Returns the new row id.
pub async fn add(
    db: &Database,
    group_hash: &str,
    payload: &str,
    received_at: &str,
    scheduled_process_at: &str,
) -> Result<i64, CharlaError> {
    let group_hash = group_hash.to_string();
    let payload = payload.to_string();
    let received_at = received_at.to_string();
    let scheduled_process_at = scheduled_process_at.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            // Reset the debounce clock for the whole unclaimed group.
            tx.execute(
                "UPDATE pending_messages SET scheduled_process_at = ?1
                 WHERE group_hash = ?2 AND processing_started_at IS NULL",
                params![scheduled_process_at, group_hash],
            )?;
            tx.execute(
                "INSERT INTO pending_messages
                     (group_hash, payload, received_at, scheduled_process_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![group_hash, payload, received_at, scheduled_process_at],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Distinct group hashes with at least one mature, unclaimed, non-dead record.
pub async fn get_mature_sessions(
    db: &Database,
    now: &str,
    max_retries: u32,
) -> Result<Vec<String>, CharlaError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT DISTINCT group_hash FROM pending_messages WHERE {MATURE_PREDICATE}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![now, max_retries], |row| row.get(0))?;
            let mut hashes = Vec::new();
            for row in rows {
                hashes.push(row?);
            }
            Ok(hashes)
        })
        .await
        .map_err(map_tr_err)
}

/// Existence check using the identical predicate as [`get_mature_sessions`].
pub async fn has_pending_messages(
    db: &Database,
    now: &str,
    max_retries: u32,
) -> Result<bool, CharlaError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM pending_messages WHERE {MATURE_PREDICATE})"
            );
            let exists: i64 = conn.query_row(&sql, params![now, max_retries], |row| row.get(0))?;
            Ok(exists != 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim all unclaimed records of a group.
///
/// Returns `false` if any record of the group is already claimed (another
/// worker holds the lock) or if there is nothing to claim. Atomicity holds
/// because all writes are serialized through the single connection thread
/// and the check + update run inside one transaction.
pub async fn claim_session(db: &Database, group_hash: &str, now: &str) -> Result<bool, CharlaError> {
    let group_hash = group_hash.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let already_claimed: i64 = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM pending_messages
                 WHERE group_hash = ?1 AND processing_started_at IS NOT NULL)",
                params![group_hash],
                |row| row.get(0),
            )?;
            if already_claimed != 0 {
                tx.commit()?;
                return Ok(false);
            }

            let claimed = tx.execute(
                "UPDATE pending_messages SET processing_started_at = ?1
                 WHERE group_hash = ?2 AND processing_started_at IS NULL",
                params![now, group_hash],
            )?;
            tx.commit()?;
            Ok(claimed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// The claimed group, ordered by arrival time for deterministic replay.
pub async fn get_by_session(
    db: &Database,
    group_hash: &str,
) -> Result<Vec<PendingMessage>, CharlaError> {
    let group_hash = group_hash.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM pending_messages WHERE group_hash = ?1
                 ORDER BY received_at ASC, id ASC",
                PendingMessage::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![group_hash], PendingMessage::from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove successfully processed records.
pub async fn delete_by_ids(db: &Database, ids: &[i64]) -> Result<usize, CharlaError> {
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for id in &ids {
                deleted += tx.execute("DELETE FROM pending_messages WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
        .map_err(map_tr_err)
}

/// Release the claim and count a failed attempt for the whole group.
///
/// `scheduled_process_at` is left unchanged: it is already in the past, so
/// the group stays immediately mature until it hits the retry ceiling.
pub async fn mark_for_retry(
    db: &Database,
    group_hash: &str,
    error: &str,
) -> Result<usize, CharlaError> {
    let group_hash = group_hash.to_string();
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE pending_messages
                 SET processing_started_at = NULL,
                     retry_count = retry_count + 1,
                     last_error = ?1
                 WHERE group_hash = ?2 AND processing_started_at IS NOT NULL",
                params![error, group_hash],
            )?;
            Ok(updated)
        })
        .await
        .map_err(map_tr_err)
}

/// Counts returned by [`cleanup_stale_messages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupCounts {
    /// Records deleted for exceeding the retry ceiling.
    pub dead_lettered: usize,
    /// Records whose abandoned claim lock was cleared.
    pub zombies_released: usize,
}

/// Two independent sweeps: delete dead-lettered records, then release
/// claim locks older than the zombie cutoff so their groups become
/// claimable again.
pub async fn cleanup_stale_messages(
    db: &Database,
    max_retries: u32,
    zombie_cutoff: &str,
) -> Result<CleanupCounts, CharlaError> {
    let zombie_cutoff = zombie_cutoff.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let dead_lettered = tx.execute(
                "DELETE FROM pending_messages WHERE retry_count >= ?1",
                params![max_retries],
            )?;
            let zombies_released = tx.execute(
                "UPDATE pending_messages SET processing_started_at = NULL
                 WHERE processing_started_at IS NOT NULL AND processing_started_at <= ?1",
                params![zombie_cutoff],
            )?;
            tx.commit()?;
            Ok(CleanupCounts {
                dead_lettered,
                zombies_released,
            })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use charla_core::time::format_ts;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn ts(offset_secs: i64) -> String {
        format_ts(Utc::now() + Duration::seconds(offset_secs))
    }

    const MAX_RETRIES: u32 = 3;

    #[tokio::test]
    async fn burst_coalesces_into_one_mature_group() {
        let (db, _dir) = setup_db().await;

        // Three arrivals in a burst; each resets the group deadline.
        add(&db, "g1", r#"{"n":1}"#, &ts(-30), &ts(-20)).await.unwrap();
        add(&db, "g1", r#"{"n":2}"#, &ts(-25), &ts(-15)).await.unwrap();
        add(&db, "g1", r#"{"n":3}"#, &ts(-20), &ts(-10)).await.unwrap();

        let mature = get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap();
        assert_eq!(mature, vec!["g1".to_string()]);

        let group = get_by_session(&db, "g1").await.unwrap();
        assert_eq!(group.len(), 3);
        // Ordered by arrival, and the deadline reset propagated to all rows.
        assert_eq!(group[0].payload, r#"{"n":1}"#);
        assert_eq!(group[2].payload, r#"{"n":3}"#);
        let deadline = &group[2].scheduled_process_at;
        assert!(group.iter().all(|m| &m.scheduled_process_at == deadline));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn deadline_in_future_is_not_mature() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(0), &ts(30)).await.unwrap();

        let mature = get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap();
        assert!(mature.is_empty());
        assert!(!has_pending_messages(&db, &ts(0), MAX_RETRIES).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-10), &ts(-5)).await.unwrap();

        let first = claim_session(&db, "g1", &ts(0)).await.unwrap();
        let second = claim_session(&db, "g1", &ts(0)).await.unwrap();
        assert!(first);
        assert!(!second);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_claims_only_one_wins() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-10), &ts(-5)).await.unwrap();

        let now = ts(0);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let now = now.clone();
            handles.push(tokio::spawn(async move {
                claim_session(&db, "g1", &now).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claimed_group_is_not_mature() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-10), &ts(-5)).await.unwrap();
        claim_session(&db, "g1", &ts(0)).await.unwrap();

        let mature = get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap();
        assert!(mature.is_empty());
        assert!(!has_pending_messages(&db, &ts(0), MAX_RETRIES).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_for_retry_releases_lock_and_counts() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-10), &ts(-5)).await.unwrap();
        claim_session(&db, "g1", &ts(0)).await.unwrap();

        mark_for_retry(&db, "g1", "provider down").await.unwrap();

        let group = get_by_session(&db, "g1").await.unwrap();
        assert_eq!(group[0].retry_count, 1);
        assert_eq!(group[0].last_error.as_deref(), Some("provider down"));
        assert!(group[0].processing_started_at.is_none());

        // Deadline unchanged and in the past: immediately mature again.
        let mature = get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap();
        assert_eq!(mature, vec!["g1".to_string()]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn dead_letter_excluded_from_mature_set() {
        let (db, _dir) = setup_db().await;
        // Deadline far in the past; retries exhausted.
        add(&db, "g1", "{}", &ts(-9000), &ts(-9000)).await.unwrap();
        for _ in 0..MAX_RETRIES {
            claim_session(&db, "g1", &ts(0)).await.unwrap();
            mark_for_retry(&db, "g1", "boom").await.unwrap();
        }

        let mature = get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap();
        assert!(mature.is_empty());
        assert!(!has_pending_messages(&db, &ts(0), MAX_RETRIES).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mature_set_and_has_pending_agree_across_buffer_states() {
        let (db, _dir) = setup_db().await;

        // Empty buffer.
        let now = ts(0);
        assert_eq!(
            has_pending_messages(&db, &now, MAX_RETRIES).await.unwrap(),
            !get_mature_sessions(&db, &now, MAX_RETRIES).await.unwrap().is_empty()
        );

        // Zombie-only: claimed long ago, never finished.
        add(&db, "zombie", "{}", &ts(-600), &ts(-590)).await.unwrap();
        claim_session(&db, "zombie", &ts(-400)).await.unwrap();

        // Dead-letter-only group.
        add(&db, "dead", "{}", &ts(-600), &ts(-590)).await.unwrap();
        for _ in 0..MAX_RETRIES {
            claim_session(&db, "dead", &ts(0)).await.unwrap();
            mark_for_retry(&db, "dead", "x").await.unwrap();
        }

        let now = ts(0);
        assert_eq!(
            has_pending_messages(&db, &now, MAX_RETRIES).await.unwrap(),
            !get_mature_sessions(&db, &now, MAX_RETRIES).await.unwrap().is_empty()
        );

        // Mixed: add a genuinely mature group.
        add(&db, "live", "{}", &ts(-20), &ts(-10)).await.unwrap();
        let now = ts(0);
        assert!(has_pending_messages(&db, &now, MAX_RETRIES).await.unwrap());
        assert_eq!(
            get_mature_sessions(&db, &now, MAX_RETRIES).await.unwrap(),
            vec!["live".to_string()]
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn zombie_release_makes_group_claimable_again() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-600), &ts(-590)).await.unwrap();
        claim_session(&db, "g1", &ts(-400)).await.unwrap();

        // Locked: excluded before cleanup.
        assert!(get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap().is_empty());

        let counts = cleanup_stale_messages(&db, MAX_RETRIES, &ts(-300)).await.unwrap();
        assert_eq!(counts.zombies_released, 1);
        assert_eq!(counts.dead_lettered, 0);

        // Included immediately after release.
        assert_eq!(
            get_mature_sessions(&db, &ts(0), MAX_RETRIES).await.unwrap(),
            vec!["g1".to_string()]
        );
        assert!(claim_session(&db, "g1", &ts(0)).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fresh_lock_survives_zombie_sweep() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-20), &ts(-10)).await.unwrap();
        claim_session(&db, "g1", &ts(0)).await.unwrap();

        let counts = cleanup_stale_messages(&db, MAX_RETRIES, &ts(-300)).await.unwrap();
        assert_eq!(counts.zombies_released, 0);

        let group = get_by_session(&db, "g1").await.unwrap();
        assert!(group[0].processing_started_at.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_deletes_dead_letters() {
        let (db, _dir) = setup_db().await;
        add(&db, "g1", "{}", &ts(-600), &ts(-590)).await.unwrap();
        for _ in 0..MAX_RETRIES {
            claim_session(&db, "g1", &ts(0)).await.unwrap();
            mark_for_retry(&db, "g1", "x").await.unwrap();
        }

        let counts = cleanup_stale_messages(&db, MAX_RETRIES, &ts(-300)).await.unwrap();
        assert_eq!(counts.dead_lettered, 1);
        assert!(get_by_session(&db, "g1").await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_by_ids_removes_processed_rows() {
        let (db, _dir) = setup_db().await;
        let id1 = add(&db, "g1", r#"{"n":1}"#, &ts(-10), &ts(-5)).await.unwrap();
        let id2 = add(&db, "g1", r#"{"n":2}"#, &ts(-9), &ts(-5)).await.unwrap();

        let deleted = delete_by_ids(&db, &[id1, id2]).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(get_by_session(&db, "g1").await.unwrap().is_empty());

        db.close().await.unwrap();
    }
}
