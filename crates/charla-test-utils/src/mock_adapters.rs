// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding, media, and notifier adapters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use charla_core::traits::{EmbeddingAdapter, MediaAdapter, NotifierAdapter};
use charla_core::types::{EscalationAlert, ImageAnalysis, Transcription};
use charla_core::CharlaError;

/// Deterministic embedder: hashes bytes into a small fixed-dimension vector.
/// Equal inputs embed identically; different inputs almost always differ.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dimensions: 8 }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CharlaError> {
        let mut vector = vec![0f32; self.dimensions];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimensions] += f32::from(byte) / 255.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Media adapter returning canned enrichment, or failing on demand so tests
/// can exercise the placeholder fallback.
pub struct MockMedia {
    fail: AtomicBool,
}

impl MockMedia {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CharlaError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CharlaError::Media {
                message: "mock media failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaAdapter for MockMedia {
    async fn transcribe(&self, url: &str) -> Result<Transcription, CharlaError> {
        self.check()?;
        Ok(Transcription {
            text: format!("transcript of {url}"),
            confidence: 0.95,
            duration_secs: 4.2,
        })
    }

    async fn analyze_image(&self, url: &str) -> Result<ImageAnalysis, CharlaError> {
        self.check()?;
        Ok(ImageAnalysis {
            description: format!("description of {url}"),
        })
    }
}

/// Notifier that records every alert for later assertions.
pub struct MockNotifier {
    alerts: Arc<Mutex<Vec<(String, EscalationAlert)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            alerts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn alerts(&self) -> Vec<(String, EscalationAlert)> {
        self.alerts.lock().await.clone()
    }

    /// Shared handle so a test can keep asserting after the notifier is
    /// boxed into the engine.
    pub fn alerts_handle(&self) -> Arc<Mutex<Vec<(String, EscalationAlert)>>> {
        self.alerts.clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotifierAdapter for MockNotifier {
    async fn send_escalation_alert(
        &self,
        destination: &str,
        alert: &EscalationAlert,
    ) -> Result<(), CharlaError> {
        self.alerts
            .lock()
            .await
            .push((destination.to_string(), alert.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedder_is_deterministic_and_normalized() {
        let embedder = MockEmbedder::new();
        let a = embedder.embed("pricing question").await.unwrap();
        let b = embedder.embed("pricing question").await.unwrap();
        let c = embedder.embed("totally different").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn media_failure_toggle_works() {
        let media = MockMedia::new();
        assert!(media.transcribe("https://cdn/a.ogg").await.is_ok());
        media.set_failing(true);
        assert!(media.analyze_image("https://cdn/b.jpg").await.is_err());
    }
}
