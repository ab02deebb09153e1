// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Charla conversation backend.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Charla workspace. Collaborator adapters
//! (LLM providers, embedders, media services, notifiers, usage sinks)
//! implement traits defined here.

pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::CharlaError;
pub use types::{ChannelKind, InboundMessage, SessionKey};

pub use traits::{
    EmbeddingAdapter, FallbackProvider, MediaAdapter, NotifierAdapter, ProviderAdapter,
    TracingUsageLogger, UsageLogger,
};
