// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Development stand-ins for the injectable collaborators.
//!
//! Real provider, embedding, media, and notification integrations are
//! host concerns wired in by the deployment; these local adapters keep
//! the binary runnable end to end without network access.

use std::sync::Arc;

use async_trait::async_trait;
use charla_config::model::CharlaConfig;
use charla_core::traits::{
    EmbeddingAdapter, MediaAdapter, NotifierAdapter, ProviderAdapter, TracingUsageLogger,
};
use charla_core::types::{
    ChatMessage, EscalationAlert, ImageAnalysis, ProviderReply, TokenUsage, Transcription,
};
use charla_core::CharlaError;
use charla_engine::EngineDeps;
use tracing::info;

/// Echoes a structured acknowledgment of the last user message. Useful for
/// exercising the full pipeline locally; replies are deliberately inert.
pub struct DevProvider;

#[async_trait]
impl ProviderAdapter for DevProvider {
    fn name(&self) -> &str {
        "dev-echo"
    }

    async fn generate_response(
        &self,
        _system_prompt: &str,
        messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<ProviderReply, CharlaError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let body = serde_json::json!({
            "responses": [format!("(dev) received: {last}")],
            "uncertain": true,
        });
        Ok(ProviderReply {
            content: body.to_string(),
            usage: TokenUsage::default(),
            finish_reason: Some("end_turn".to_string()),
        })
    }
}

/// Byte-hashing embedder with a small fixed dimensionality.
pub struct DevEmbedder;

#[async_trait]
impl EmbeddingAdapter for DevEmbedder {
    fn name(&self) -> &str {
        "dev-embedder"
    }

    fn dimensions(&self) -> usize {
        16
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CharlaError> {
        let mut vector = vec![0f32; self.dimensions()];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 16] += f32::from(byte) / 255.0;
        }
        Ok(vector)
    }
}

/// Always fails, so the engine exercises its placeholder fallback.
pub struct DevMedia;

#[async_trait]
impl MediaAdapter for DevMedia {
    async fn transcribe(&self, _url: &str) -> Result<Transcription, CharlaError> {
        Err(CharlaError::Media {
            message: "no media service configured".to_string(),
        })
    }

    async fn analyze_image(&self, _url: &str) -> Result<ImageAnalysis, CharlaError> {
        Err(CharlaError::Media {
            message: "no media service configured".to_string(),
        })
    }
}

/// Logs alerts instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl NotifierAdapter for LogNotifier {
    async fn send_escalation_alert(
        &self,
        destination: &str,
        alert: &EscalationAlert,
    ) -> Result<(), CharlaError> {
        info!(
            destination,
            reason = %alert.reason,
            user = alert.user_name.as_deref().unwrap_or("unknown"),
            "escalation alert (log-only notifier)"
        );
        Ok(())
    }
}

/// Assemble the development dependency set.
pub fn dev_deps(config: &CharlaConfig) -> EngineDeps {
    let notifier: Option<Arc<dyn NotifierAdapter>> = config
        .escalation
        .alert_destination
        .as_ref()
        .map(|_| Arc::new(LogNotifier) as Arc<dyn NotifierAdapter>);
    EngineDeps {
        provider: Arc::new(DevProvider),
        embedder: Arc::new(DevEmbedder),
        media: Arc::new(DevMedia),
        notifier,
        usage_logger: Arc::new(TracingUsageLogger),
    }
}
