// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media adapter trait for audio transcription and image analysis.

use async_trait::async_trait;

use crate::error::CharlaError;
use crate::types::{ImageAnalysis, Transcription};

/// Adapter for synchronous media enrichment of inbound messages.
///
/// Failures are non-fatal: the engine substitutes a placeholder and continues.
#[async_trait]
pub trait MediaAdapter: Send + Sync + 'static {
    /// Transcribes an audio attachment by URL.
    async fn transcribe(&self, url: &str) -> Result<Transcription, CharlaError>;

    /// Describes an image attachment by URL.
    async fn analyze_image(&self, url: &str) -> Result<ImageAnalysis, CharlaError>;
}
