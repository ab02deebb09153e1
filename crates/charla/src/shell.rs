// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `charla shell` command implementation.
//!
//! Feeds stdin lines through the real pipeline: each line is buffered,
//! debounced, claimed, and processed exactly as channel traffic would be.
//! Useful for poking at flow definitions and prompts locally.

use std::time::Duration;

use charla_config::model::CharlaConfig;
use charla_core::types::{ChannelKind, InboundMessage, SessionKey};
use charla_core::CharlaError;
use charla_engine::ConversationEngine;
use charla_flow::FollowupScheduler;
use charla_storage::{Database, MessageBuffer};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::adapters::dev_deps;

/// Runs the `charla shell` command.
pub async fn run_shell(config: CharlaConfig) -> Result<(), CharlaError> {
    crate::serve::init_tracing(&config.agent.log_level);

    let db = Database::open(&config.storage.database_path).await?;
    let buffer = MessageBuffer::new(db.clone(), config.buffer.clone());
    let scheduler = FollowupScheduler::new(db.clone(), config.followup.clone());
    let engine = ConversationEngine::new(db.clone(), config.clone(), dev_deps(&config));

    let key = SessionKey::new(ChannelKind::Web, "shell", "local-user");
    println!("charla shell. Type a message, or /quit to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| CharlaError::Internal(format!("stdin read failed: {e}")))?
        else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        buffer
            .add(&InboundMessage::text(key.clone(), line))
            .await?;
        tokio::time::sleep(Duration::from_millis(config.buffer.debounce_ms + 50)).await;

        let processed =
            crate::worker::process_mature_sessions(&db, &buffer, &engine, &scheduler).await?;
        if processed == 0 {
            println!("(no mature batch; another worker may hold the claim)");
            continue;
        }
        // Responses were persisted; show the tail of the transcript.
        let session = charla_storage::queries::sessions::get_by_group_hash(&db, &key.group_hash())
            .await?;
        if let Some(session) = session {
            let history = charla_storage::queries::messages::get_recent_messages(
                &db,
                &session.id,
                config.engine.history_limit,
            )
            .await?;
            let tail: Vec<_> = history
                .iter()
                .rev()
                .take_while(|m| m.role == "assistant")
                .collect();
            for message in tail.iter().rev() {
                println!("bot> {}", message.content);
            }
        }
    }

    db.close().await?;
    Ok(())
}
