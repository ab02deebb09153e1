// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured replies,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use charla_core::traits::ProviderAdapter;
use charla_core::types::{ChatMessage, ProviderReply, TokenUsage};
use charla_core::CharlaError;

/// One scripted outcome for a provider call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with a transient provider error carrying this message.
    Error(String),
}

/// A mock LLM provider that pops scripted replies from a FIFO queue.
///
/// When the queue is empty, a default "mock response" text is returned.
/// The invocation counter lets tests assert exactly how many attempts the
/// engine's retry loop made.
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    invocations: Arc<AtomicU32>,
    last_system_prompt: Arc<Mutex<Option<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty reply queue.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            invocations: Arc::new(AtomicU32::new(0)),
            last_system_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a mock provider pre-loaded with the given text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let queue: VecDeque<MockReply> = responses.into_iter().map(MockReply::Text).collect();
        Self {
            replies: Arc::new(Mutex::new(queue)),
            invocations: Arc::new(AtomicU32::new(0)),
            last_system_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a text reply to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(MockReply::Text(text.into()));
    }

    /// Add a failing call to the end of the queue.
    pub async fn add_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(MockReply::Error(message.into()));
    }

    /// Total number of `generate_response` calls made so far.
    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The system prompt of the most recent call.
    pub async fn last_system_prompt(&self) -> Option<String> {
        self.last_system_prompt.lock().await.clone()
    }

    async fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::Text("mock response".to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    async fn generate_response(
        &self,
        system_prompt: &str,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<ProviderReply, CharlaError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *self.last_system_prompt.lock().await = Some(system_prompt.to_string());
        match self.next_reply().await {
            MockReply::Text(content) => Ok(ProviderReply {
                content,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 20,
                },
                finish_reason: Some("end_turn".to_string()),
            }),
            MockReply::Error(message) => Err(CharlaError::Provider {
                message,
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_pop_in_order_then_default() {
        let provider = MockProvider::new();
        provider.add_response("first").await;
        provider.add_error("boom").await;

        let reply = provider
            .generate_response("sys", &[ChatMessage::user("hi")], 0.7, 256)
            .await
            .unwrap();
        assert_eq!(reply.content, "first");

        assert!(provider
            .generate_response("sys", &[], 0.7, 256)
            .await
            .is_err());

        let reply = provider.generate_response("sys", &[], 0.7, 256).await.unwrap();
        assert_eq!(reply.content, "mock response");
        assert_eq!(provider.invocation_count(), 3);
    }
}
