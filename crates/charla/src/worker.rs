// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker passes over the message buffer and the follow-up queue.
//!
//! Each pass is a single poll cycle; the serve loops call these on their
//! timers. All cross-worker coordination goes through the claim locks, so
//! any number of workers can run these concurrently against one database.

use charla_core::types::InboundMessage;
use charla_core::CharlaError;
use charla_engine::ConversationEngine;
use charla_flow::FollowupScheduler;
use charla_storage::queries::sessions;
use charla_storage::{Database, MessageBuffer};
use tracing::{debug, info, warn};

/// Claim and process every mature session once. Returns the number of
/// batches processed successfully.
pub async fn process_mature_sessions(
    db: &Database,
    buffer: &MessageBuffer,
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
) -> Result<usize, CharlaError> {
    let mature = buffer.get_mature_sessions().await?;
    let mut processed = 0usize;
    for group_hash in mature {
        if !buffer.claim_session(&group_hash).await? {
            debug!(group_hash = %group_hash, "claim lost to another worker");
            continue;
        }
        match process_claimed_group(db, buffer, engine, scheduler, &group_hash).await {
            Ok(()) => processed += 1,
            Err(e) => {
                warn!(group_hash = %group_hash, error = %e, "batch failed, marked for retry");
                buffer.mark_for_retry(&group_hash, &e.to_string()).await?;
            }
        }
    }
    Ok(processed)
}

async fn process_claimed_group(
    db: &Database,
    buffer: &MessageBuffer,
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
    group_hash: &str,
) -> Result<(), CharlaError> {
    let rows = buffer.get_by_session(group_hash).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let batch: Vec<InboundMessage> = rows
        .iter()
        .map(|row| {
            serde_json::from_str(&row.payload)
                .map_err(|e| CharlaError::Internal(format!("corrupt buffered payload: {e}")))
        })
        .collect::<Result<_, _>>()?;

    let output = engine.process_batch(&batch).await?;
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    buffer.delete_by_ids(&ids).await?;
    info!(
        group_hash = %group_hash,
        messages = ids.len(),
        responses = output.responses.len(),
        escalated = output.escalated,
        "batch processed"
    );

    // Arm the first follow-up for whatever state the session landed in.
    if !output.escalated {
        schedule_followup(db, engine, scheduler, &output.session_id).await;
    }
    Ok(())
}

/// Run one pass over due follow-up items.
pub async fn process_due_followups(
    db: &Database,
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
) -> Result<usize, CharlaError> {
    let due = scheduler.due_items().await?;
    let mut sent = 0usize;
    for item in due {
        if !scheduler.claim(item.id).await? {
            continue;
        }
        match engine.generate_followup(&item.session_id, &item.config_name).await {
            Ok(Some(_body)) => {
                scheduler.mark_sent(item.id).await?;
                sent += 1;
                advance_and_schedule(db, engine, scheduler, &item.session_id).await;
            }
            Ok(None) => {
                // Session escalated or gone; drop the rest of its queue.
                scheduler.cancel_pending(&item.session_id).await?;
                debug!(item_id = item.id, session_id = %item.session_id, "follow-up cancelled");
            }
            Err(e) => {
                warn!(item_id = item.id, error = %e, "follow-up failed");
                scheduler.mark_failed(item.id, &e.to_string()).await?;
            }
        }
    }
    Ok(sent)
}

/// Advance the sequence cursor past the item just sent, then arm the next
/// step if one exists. Scheduling failures are logged, not fatal: the
/// conversation is intact either way.
async fn advance_and_schedule(
    db: &Database,
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
    session_id: &str,
) {
    let session = match sessions::get_session(db, session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return,
        Err(e) => {
            warn!(session_id, error = %e, "session reload failed after follow-up");
            return;
        }
    };
    let next_index = session.followup_index + 1;
    if let Err(e) = scheduler.advance_index(session_id, next_index).await {
        warn!(session_id, error = %e, "failed to advance follow-up cursor");
        return;
    }
    let mut session = session;
    session.followup_index = next_index;
    schedule_for_session(engine, scheduler, &session).await;
}

async fn schedule_followup(
    db: &Database,
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
    session_id: &str,
) {
    match sessions::get_session(db, session_id).await {
        Ok(Some(session)) => schedule_for_session(engine, scheduler, &session).await,
        Ok(None) => {}
        Err(e) => warn!(session_id, error = %e, "session reload failed after batch"),
    }
}

async fn schedule_for_session(
    engine: &ConversationEngine,
    scheduler: &FollowupScheduler,
    session: &charla_storage::models::Session,
) {
    let Some(state_config) = engine.state_config_for(session).await else {
        return;
    };
    if let Err(e) = scheduler.schedule_next(session, &state_config).await {
        warn!(session_id = %session.id, error = %e, "follow-up scheduling failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charla_config::model::CharlaConfig;
    use charla_core::types::{ChannelKind, SessionKey};
    use charla_engine::EngineDeps;
    use charla_storage::models::FlowRecord;
    use charla_storage::queries::{flows, followups};
    use charla_test_utils::{MockEmbedder, MockMedia, MockProvider, TestDb};
    use std::sync::Arc;

    struct TestWorker {
        harness: TestDb,
        buffer: MessageBuffer,
        engine: ConversationEngine,
        scheduler: FollowupScheduler,
        provider: Arc<MockProvider>,
    }

    async fn setup() -> TestWorker {
        let mut config = CharlaConfig::default();
        config.buffer.debounce_ms = 10;
        config.engine.retry_delay_ms = 1;

        let harness = TestDb::new().await;
        flows::upsert_flow(
            &harness.db,
            &FlowRecord {
                name: "sales".to_string(),
                version: 1,
                active: true,
                definition: serde_json::json!({
                    "initial_state": "greeting",
                    "states": {
                        "greeting": {
                            "objective": "Welcome",
                            "allowed_transitions": [],
                            "followup_sequence": [
                                {"interval": "15m", "config_name": "nudge-1"}
                            ]
                        }
                    }
                })
                .to_string(),
            },
        )
        .await
        .unwrap();

        let provider = Arc::new(MockProvider::new());
        let engine = ConversationEngine::new(
            harness.db.clone(),
            config.clone(),
            EngineDeps {
                provider: provider.clone(),
                embedder: Arc::new(MockEmbedder::new()),
                media: Arc::new(MockMedia::new()),
                notifier: None,
                usage_logger: Arc::new(charla_core::traits::TracingUsageLogger),
            },
        );
        let buffer = MessageBuffer::new(harness.db.clone(), config.buffer.clone());
        let scheduler = FollowupScheduler::new(harness.db.clone(), config.followup.clone());
        TestWorker {
            harness,
            buffer,
            engine,
            scheduler,
            provider,
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage::text(
            SessionKey::new(ChannelKind::Whatsapp, "biz-1", "+5511999"),
            text,
        )
    }

    #[tokio::test]
    async fn mature_batch_is_processed_and_followup_armed() {
        let t = setup().await;
        t.provider
            .add_response(serde_json::json!({"responses": ["hello!"]}).to_string())
            .await;

        t.buffer.add(&inbound("hi")).await.unwrap();
        t.buffer.add(&inbound("anyone there?")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let processed =
            process_mature_sessions(&t.harness.db, &t.buffer, &t.engine, &t.scheduler)
                .await
                .unwrap();
        assert_eq!(processed, 1);
        assert!(!t.buffer.has_pending_messages().await.unwrap());

        // A 15m follow-up was enqueued for the session's state.
        let due = followups::get_due_items(&t.harness.db, "2099-01-01T00:00:00.000Z", 3)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].config_name, "nudge-1");
    }

    #[tokio::test]
    async fn failed_batch_is_marked_for_retry_and_stays_mature() {
        let t = setup().await;
        // All attempts fail at the provider; the engine still answers with
        // its canned fallback, so force a harder failure: corrupt payload.
        t.buffer.add(&inbound("hi")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let mature = t.buffer.get_mature_sessions().await.unwrap();
        let hash = mature[0].clone();

        // Corrupt the buffered payload directly.
        t.harness
            .db
            .connection()
            .call(move |conn| {
                conn.execute("UPDATE pending_messages SET payload = 'not json'", [])?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();

        process_mature_sessions(&t.harness.db, &t.buffer, &t.engine, &t.scheduler)
            .await
            .unwrap();

        // Lock released, retry counted, group still mature.
        let rows = t.buffer.get_by_session(&hash).await.unwrap();
        assert_eq!(rows[0].retry_count, 1);
        assert!(rows[0].processing_started_at.is_none());
        assert!(rows[0].last_error.is_some());
        assert!(t.buffer.has_pending_messages().await.unwrap());
    }

    #[tokio::test]
    async fn due_followup_is_sent_and_cursor_advances() {
        let t = setup().await;
        t.provider
            .add_response(serde_json::json!({"responses": ["hello!"]}).to_string())
            .await;
        t.buffer.add(&inbound("hi")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        process_mature_sessions(&t.harness.db, &t.buffer, &t.engine, &t.scheduler)
            .await
            .unwrap();

        flows::upsert_followup_config(
            &t.harness.db,
            "nudge-1",
            &serde_json::json!({"body": "Still there?"}).to_string(),
        )
        .await
        .unwrap();

        // Pull the scheduled item into the past so it becomes due.
        t.harness
            .db
            .connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE followup_queue SET scheduled_at = '2020-01-01T00:00:00.000Z'",
                    [],
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .unwrap();

        let sent = process_due_followups(&t.harness.db, &t.engine, &t.scheduler)
            .await
            .unwrap();
        assert_eq!(sent, 1);

        let session = {
            let sessions = charla_storage::queries::sessions::get_by_group_hash(
                &t.harness.db,
                &inbound("x").key.group_hash(),
            )
            .await
            .unwrap();
            sessions.unwrap()
        };
        assert_eq!(session.followup_index, 0);

        // Single-step sequence: nothing further is armed.
        let due = followups::get_due_items(&t.harness.db, "2099-01-01T00:00:00.000Z", 3)
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
