// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message buffer: a debounced, lockable queue keyed by conversation
//! identity.
//!
//! Wraps the `queries::buffer` operations with the configured debounce
//! window, retry ceiling, and zombie threshold, and owns timestamp
//! computation so callers never hand-roll cutoffs.

use charla_config::model::BufferConfig;
use charla_core::time::{format_ts, now_ts};
use charla_core::{CharlaError, InboundMessage};
use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::database::Database;
use crate::models::PendingMessage;
use crate::queries::buffer as q;

pub use crate::queries::buffer::CleanupCounts;

/// Debounced per-conversation inbound queue with claim/dead-letter discipline.
#[derive(Clone)]
pub struct MessageBuffer {
    db: Database,
    config: BufferConfig,
}

impl MessageBuffer {
    pub fn new(db: Database, config: BufferConfig) -> Self {
        Self { db, config }
    }

    /// Buffer an inbound message, resetting the debounce clock for the
    /// whole unclaimed group. Returns the new row id.
    pub async fn add(&self, message: &InboundMessage) -> Result<i64, CharlaError> {
        let group_hash = message.key.group_hash();
        let payload = serde_json::to_string(message)
            .map_err(|e| CharlaError::Internal(format!("failed to serialize payload: {e}")))?;
        let now = Utc::now();
        let deadline = format_ts(now + Duration::milliseconds(self.config.debounce_ms as i64));
        let id = q::add(&self.db, &group_hash, &payload, &format_ts(now), &deadline).await?;
        debug!(group_hash = %group_hash, id, deadline = %deadline, "buffered inbound message");
        Ok(id)
    }

    /// Distinct group hashes with actionable work.
    pub async fn get_mature_sessions(&self) -> Result<Vec<String>, CharlaError> {
        q::get_mature_sessions(&self.db, &now_ts(), self.config.max_retries).await
    }

    /// Existence check sharing the mature predicate.
    pub async fn has_pending_messages(&self) -> Result<bool, CharlaError> {
        q::has_pending_messages(&self.db, &now_ts(), self.config.max_retries).await
    }

    /// Atomically claim a group; `false` means another worker holds it.
    pub async fn claim_session(&self, group_hash: &str) -> Result<bool, CharlaError> {
        q::claim_session(&self.db, group_hash, &now_ts()).await
    }

    /// The claimed group in arrival order.
    pub async fn get_by_session(
        &self,
        group_hash: &str,
    ) -> Result<Vec<PendingMessage>, CharlaError> {
        q::get_by_session(&self.db, group_hash).await
    }

    /// Remove successfully processed rows.
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<usize, CharlaError> {
        q::delete_by_ids(&self.db, ids).await
    }

    /// Release the claim and count a failed attempt for the group.
    pub async fn mark_for_retry(&self, group_hash: &str, error: &str) -> Result<(), CharlaError> {
        let updated = q::mark_for_retry(&self.db, group_hash, error).await?;
        info!(group_hash = %group_hash, updated, error, "buffer group marked for retry");
        Ok(())
    }

    /// Dead-letter sweep plus zombie-lock release. Must run on an
    /// independent periodic schedule: a quiet conversation with a crashed
    /// worker has no other recovery path.
    pub async fn cleanup_stale_messages(&self) -> Result<CleanupCounts, CharlaError> {
        let cutoff = format_ts(
            Utc::now() - Duration::seconds(self.config.zombie_threshold_secs as i64),
        );
        let counts = q::cleanup_stale_messages(&self.db, self.config.max_retries, &cutoff).await?;
        if counts.dead_lettered > 0 || counts.zombies_released > 0 {
            info!(
                dead_lettered = counts.dead_lettered,
                zombies_released = counts.zombies_released,
                "buffer cleanup sweep"
            );
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charla_core::{ChannelKind, SessionKey};
    use tempfile::tempdir;

    fn test_config(debounce_ms: u64) -> BufferConfig {
        BufferConfig {
            debounce_ms,
            max_retries: 3,
            zombie_threshold_secs: 300,
            poll_interval_ms: 100,
            cleanup_interval_secs: 60,
        }
    }

    fn msg(user: &str, text: &str) -> InboundMessage {
        InboundMessage::text(
            SessionKey::new(ChannelKind::Whatsapp, "biz", user),
            text,
        )
    }

    #[tokio::test]
    async fn burst_matures_once_after_debounce_window() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let buffer = MessageBuffer::new(db.clone(), test_config(50));

        buffer.add(&msg("u1", "first")).await.unwrap();
        buffer.add(&msg("u1", "second")).await.unwrap();
        buffer.add(&msg("u1", "third")).await.unwrap();

        // Inside the window: nothing is mature.
        assert!(buffer.get_mature_sessions().await.unwrap().is_empty());
        assert!(!buffer.has_pending_messages().await.unwrap());

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;

        let mature = buffer.get_mature_sessions().await.unwrap();
        assert_eq!(mature.len(), 1);
        assert!(buffer.has_pending_messages().await.unwrap());

        assert!(buffer.claim_session(&mature[0]).await.unwrap());
        let group = buffer.get_by_session(&mature[0]).await.unwrap();
        assert_eq!(group.len(), 3);

        // Payload round-trips to the normalized message.
        let first: InboundMessage = serde_json::from_str(&group[0].payload).unwrap();
        assert_eq!(first.text, "first");

        let ids: Vec<i64> = group.iter().map(|m| m.id).collect();
        buffer.delete_by_ids(&ids).await.unwrap();
        assert!(!buffer.has_pending_messages().await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn distinct_users_mature_independently() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let buffer = MessageBuffer::new(db.clone(), test_config(10));

        buffer.add(&msg("u1", "hello")).await.unwrap();
        buffer.add(&msg("u2", "hola")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let mature = buffer.get_mature_sessions().await.unwrap();
        assert_eq!(mature.len(), 2);

        db.close().await.unwrap();
    }
}
