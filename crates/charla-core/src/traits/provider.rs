// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM provider integrations, plus the
//! primary/fallback chaining combinator.

use async_trait::async_trait;
use tracing::warn;

use crate::error::CharlaError;
use crate::types::{ChatMessage, ProviderReply};

/// Adapter for LLM provider integrations.
///
/// Providers must be swappable with an identical contract; the engine never
/// learns which concrete provider answered.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Human-readable provider name, used in logs and usage entries.
    fn name(&self) -> &str;

    /// Sends a completion request and returns the full response.
    async fn generate_response(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ProviderReply, CharlaError>;
}

/// Chains a primary provider with a fallback, transparent to the caller.
///
/// The fallback is consulted only when the primary returns an error; a
/// successful-but-malformed reply is the engine's concern, not the chain's.
pub struct FallbackProvider {
    primary: Box<dyn ProviderAdapter>,
    fallback: Box<dyn ProviderAdapter>,
}

impl FallbackProvider {
    pub fn new(primary: Box<dyn ProviderAdapter>, fallback: Box<dyn ProviderAdapter>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ProviderAdapter for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn generate_response(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ProviderReply, CharlaError> {
        match self
            .primary
            .generate_response(system_prompt, messages, temperature, max_tokens)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "primary provider failed, trying fallback"
                );
                self.fallback
                    .generate_response(system_prompt, messages, temperature, max_tokens)
                    .await
            }
        }
    }
}
