// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `charla serve` command implementation.
//!
//! Runs three independent loops against the shared database:
//! - buffer poll: claim and process mature conversation batches;
//! - cleanup sweep: dead-letter and zombie-release passes, on its own
//!   timer so a crashed worker's locks recover even when traffic is quiet;
//! - follow-up timer: claim due queue items and send proactive messages.

use std::time::Duration;

use charla_config::model::CharlaConfig;
use charla_core::CharlaError;
use charla_engine::ConversationEngine;
use charla_flow::FollowupScheduler;
use charla_storage::{Database, MessageBuffer};
use tracing::{error, info, warn};

use crate::adapters::dev_deps;
use crate::worker;

/// Runs the `charla serve` command until interrupted.
pub async fn run_serve(config: CharlaConfig) -> Result<(), CharlaError> {
    init_tracing(&config.agent.log_level);
    info!("starting charla serve");

    let db = Database::open(&config.storage.database_path).await?;
    let buffer = MessageBuffer::new(db.clone(), config.buffer.clone());
    let scheduler = FollowupScheduler::new(db.clone(), config.followup.clone());
    let engine = ConversationEngine::new(db.clone(), config.clone(), dev_deps(&config));

    let poll_interval = Duration::from_millis(config.buffer.poll_interval_ms);
    let cleanup_interval = Duration::from_secs(config.buffer.cleanup_interval_secs);
    let followup_interval = Duration::from_secs(config.followup.poll_interval_secs);

    let buffer_task = {
        let db = db.clone();
        let buffer = buffer.clone();
        let scheduler = scheduler.clone();
        let engine = ConversationEngine::new(db.clone(), config.clone(), dev_deps(&config));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                if let Err(e) =
                    worker::process_mature_sessions(&db, &buffer, &engine, &scheduler).await
                {
                    error!(error = %e, "buffer poll pass failed");
                }
            }
        })
    };

    let cleanup_task = {
        let buffer = buffer.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = buffer.cleanup_stale_messages().await {
                    error!(error = %e, "buffer cleanup sweep failed");
                }
                match scheduler.cleanup_stale_locks().await {
                    Ok(released) if released > 0 => {
                        warn!(released, "released stale follow-up locks");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "follow-up cleanup sweep failed"),
                }
            }
        })
    };

    let followup_task = {
        let db = db.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(followup_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = worker::process_due_followups(&db, &engine, &scheduler).await {
                    error!(error = %e, "follow-up pass failed");
                }
            }
        })
    };

    info!(
        poll_ms = config.buffer.poll_interval_ms,
        cleanup_secs = config.buffer.cleanup_interval_secs,
        followup_secs = config.followup.poll_interval_secs,
        "charla serve running; press ctrl-c to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CharlaError::Internal(format!("signal handler failed: {e}")))?;

    info!("shutdown signal received");
    buffer_task.abort();
    cleanup_task.abort();
    followup_task.abort();
    db.close().await?;
    info!("charla serve shutdown complete");
    Ok(())
}

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("charla={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
