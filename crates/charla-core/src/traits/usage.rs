// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage logger trait for cost/latency accounting of model and embedding calls.

use async_trait::async_trait;

use crate::types::UsageEntry;

/// Fire-and-forget accounting sink.
///
/// Implementations must not fail loudly: the engine spawns `log` without
/// awaiting it, and errors stay on the logging side channel.
#[async_trait]
pub trait UsageLogger: Send + Sync + 'static {
    async fn log(&self, entry: UsageEntry);
}

/// Default sink that emits usage entries as structured tracing events.
pub struct TracingUsageLogger;

#[async_trait]
impl UsageLogger for TracingUsageLogger {
    async fn log(&self, entry: UsageEntry) {
        tracing::info!(
            session_id = %entry.session_id,
            model = %entry.model,
            input_tokens = entry.usage.input_tokens,
            output_tokens = entry.usage.output_tokens,
            cost_usd = entry.cost_usd,
            latency_ms = entry.latency_ms,
            finish_reason = entry.finish_reason.as_deref().unwrap_or(""),
            "model usage"
        );
    }
}
