// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator adapter traits for the Charla pipeline.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.
//! Concrete implementations (SDK clients, webhooks) live outside the core
//! and are injected by the host.

pub mod embedding;
pub mod media;
pub mod notifier;
pub mod provider;
pub mod usage;

pub use embedding::EmbeddingAdapter;
pub use media::MediaAdapter;
pub use notifier::NotifierAdapter;
pub use provider::{FallbackProvider, ProviderAdapter};
pub use usage::{TracingUsageLogger, UsageLogger};
