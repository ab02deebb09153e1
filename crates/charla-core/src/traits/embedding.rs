// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::CharlaError;

/// Adapter for generating vector embeddings from text.
///
/// Embeddings power knowledge retrieval; dimensionality is fixed per provider.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync + 'static {
    /// Human-readable embedder name.
    fn name(&self) -> &str;

    /// Fixed output dimensionality of this provider.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CharlaError>;
}
