// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up scheduling over the persistent queue.
//!
//! The scheduler owns the sequence-cursor semantics: `followup_index` is
//! -1 until the first follow-up for the current state is sent, and any
//! inbound message resets it (the engine handles the reset and cancels
//! pending items). Here we only compute the next step and enqueue it.

use charla_config::model::FollowupConfig;
use charla_core::time::{format_ts, now_ts, parse_ts};
use charla_core::CharlaError;
use charla_storage::models::{FollowupQueueItem, Session};
use charla_storage::queries::{followups, sessions};
use charla_storage::Database;
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::interval::calculate_scheduled_time;
use crate::statemachine::StateConfig;

/// A follow-up accepted into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledFollowup {
    pub item_id: i64,
    /// Index of the scheduled step within the state's sequence.
    pub step_index: i64,
    pub config_name: String,
    pub scheduled_at: String,
}

#[derive(Clone)]
pub struct FollowupScheduler {
    db: Database,
    config: FollowupConfig,
}

impl FollowupScheduler {
    pub fn new(db: Database, config: FollowupConfig) -> Self {
        Self { db, config }
    }

    /// Enqueue the next step of the state's follow-up sequence, relative to
    /// the session's cursor. Returns `None` when the sequence is exhausted
    /// or the step's interval is unparseable (never "immediately").
    pub async fn schedule_next(
        &self,
        session: &Session,
        state: &StateConfig,
    ) -> Result<Option<ScheduledFollowup>, CharlaError> {
        let next_index = session.followup_index + 1;
        let Some(step) = usize::try_from(next_index)
            .ok()
            .and_then(|i| state.followup_sequence.get(i))
        else {
            return Ok(None);
        };

        let base = session
            .last_message_at
            .as_deref()
            .and_then(|s| parse_ts(s).ok())
            .unwrap_or_else(Utc::now);
        let Some(scheduled) = calculate_scheduled_time(&step.interval, base) else {
            warn!(
                session_id = %session.id,
                interval = %step.interval,
                config_name = %step.config_name,
                "unparseable follow-up interval, step skipped"
            );
            return Ok(None);
        };

        let scheduled_at = format_ts(scheduled);
        let item_id = followups::enqueue(
            &self.db,
            &session.id,
            &step.config_name,
            &scheduled_at,
            &now_ts(),
        )
        .await?;
        debug!(
            session_id = %session.id,
            item_id,
            step_index = next_index,
            scheduled_at = %scheduled_at,
            "follow-up scheduled"
        );
        Ok(Some(ScheduledFollowup {
            item_id,
            step_index: next_index,
            config_name: step.config_name.clone(),
            scheduled_at,
        }))
    }

    /// Advance the session's cursor after a follow-up is actually sent.
    pub async fn advance_index(&self, session_id: &str, index: i64) -> Result<(), CharlaError> {
        sessions::set_followup_index(&self.db, session_id, index, &now_ts()).await
    }

    /// Items whose scheduled time has passed.
    pub async fn due_items(&self) -> Result<Vec<FollowupQueueItem>, CharlaError> {
        followups::get_due_items(&self.db, &now_ts(), self.config.max_retries).await
    }

    /// Atomically claim one due item.
    pub async fn claim(&self, id: i64) -> Result<bool, CharlaError> {
        followups::claim(&self.db, id, &now_ts()).await
    }

    pub async fn mark_sent(&self, id: i64) -> Result<(), CharlaError> {
        followups::mark_sent(&self.db, id).await
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<(), CharlaError> {
        followups::mark_failed(&self.db, id, error, self.config.max_retries).await
    }

    /// Cancel everything pending for a session (the user re-engaged).
    pub async fn cancel_pending(&self, session_id: &str) -> Result<usize, CharlaError> {
        followups::cancel_pending(&self.db, session_id).await
    }

    /// Release claims abandoned by crashed workers.
    pub async fn cleanup_stale_locks(&self) -> Result<usize, CharlaError> {
        let cutoff = format_ts(
            Utc::now() - Duration::seconds(self.config.zombie_threshold_secs as i64),
        );
        followups::cleanup_stale_locks(&self.db, &cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statemachine::FollowupStep;
    use charla_storage::queries::{contacts, sessions};
    use tempfile::tempdir;

    async fn setup() -> (Database, FollowupScheduler, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        contacts::create_contact(&db, &test_contact()).await.unwrap();
        let scheduler = FollowupScheduler::new(db.clone(), FollowupConfig::default());
        (db, scheduler, dir)
    }

    fn test_contact() -> charla_storage::models::Contact {
        charla_storage::models::Contact {
            id: "contact-1".to_string(),
            channel: "whatsapp".to_string(),
            channel_user_id: "user-1".to_string(),
            name: Some("Ana".to_string()),
            language: Some("es".to_string()),
            registered: false,
            deposit_confirmed: false,
            lifetime_value: 0.0,
            attribution: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn test_session(followup_index: i64) -> Session {
        Session {
            id: "sess-1".to_string(),
            contact_id: "contact-1".to_string(),
            channel: "whatsapp".to_string(),
            channel_id: "biz-1".to_string(),
            user_id: "user-1".to_string(),
            group_hash: "hash-1".to_string(),
            flow_name: "sales".to_string(),
            current_state: "greeting".to_string(),
            previous_state: None,
            context: None,
            escalated: false,
            escalation_reason: None,
            status: "active".to_string(),
            followup_index,
            last_message_at: Some("2026-01-01T12:00:00.000Z".to_string()),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn state_with_sequence(steps: &[(&str, &str)]) -> StateConfig {
        StateConfig {
            followup_sequence: steps
                .iter()
                .map(|(interval, name)| FollowupStep {
                    interval: interval.to_string(),
                    config_name: name.to_string(),
                })
                .collect(),
            ..StateConfig::default()
        }
    }

    #[tokio::test]
    async fn first_step_schedules_relative_to_last_message() {
        let (db, scheduler, _dir) = setup().await;
        let session = test_session(-1);
        sessions::create_session(&db, &session).await.unwrap();

        let state = state_with_sequence(&[("2h", "nudge-1"), ("1d", "nudge-2")]);
        let scheduled = scheduler
            .schedule_next(&session, &state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduled.step_index, 0);
        assert_eq!(scheduled.config_name, "nudge-1");
        assert_eq!(scheduled.scheduled_at, "2026-01-01T14:00:00.000Z");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn exhausted_sequence_schedules_nothing() {
        let (db, scheduler, _dir) = setup().await;
        let session = test_session(1);
        sessions::create_session(&db, &session).await.unwrap();

        let state = state_with_sequence(&[("2h", "nudge-1"), ("1d", "nudge-2")]);
        assert!(scheduler
            .schedule_next(&session, &state)
            .await
            .unwrap()
            .is_none());

        let empty = state_with_sequence(&[]);
        assert!(scheduler
            .schedule_next(&test_session(-1), &empty)
            .await
            .unwrap()
            .is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unparseable_interval_is_skipped_not_immediate() {
        let (db, scheduler, _dir) = setup().await;
        let session = test_session(-1);
        sessions::create_session(&db, &session).await.unwrap();

        let state = state_with_sequence(&[("whenever", "nudge-1")]);
        assert!(scheduler
            .schedule_next(&session, &state)
            .await
            .unwrap()
            .is_none());
        assert!(scheduler.due_items().await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn advance_index_then_next_step() {
        let (db, scheduler, _dir) = setup().await;
        let session = test_session(-1);
        sessions::create_session(&db, &session).await.unwrap();

        let state = state_with_sequence(&[("2h", "nudge-1"), ("1d", "nudge-2")]);
        let first = scheduler
            .schedule_next(&session, &state)
            .await
            .unwrap()
            .unwrap();
        scheduler
            .advance_index(&session.id, first.step_index)
            .await
            .unwrap();

        let updated = sessions::get_session(&db, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.followup_index, 0);

        let second = scheduler
            .schedule_next(&updated, &state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.step_index, 1);
        assert_eq!(second.config_name, "nudge-2");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_pending_clears_the_queue_for_the_session() {
        let (db, scheduler, _dir) = setup().await;
        let session = test_session(-1);
        sessions::create_session(&db, &session).await.unwrap();

        let state = state_with_sequence(&[("2h", "nudge-1")]);
        scheduler.schedule_next(&session, &state).await.unwrap();
        assert_eq!(scheduler.cancel_pending(&session.id).await.unwrap(), 1);

        db.close().await.unwrap();
    }
}
