// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Charla conversation backend.

use thiserror::Error;

/// The primary error type used across all Charla adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CharlaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    /// Fatal for the current processing attempt; the buffer retry path is the
    /// recovery mechanism.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// LLM provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding provider errors.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Media transcription/analysis errors. Non-fatal to the pipeline;
    /// callers substitute a placeholder and continue.
    #[error("media error: {message}")]
    Media { message: String },

    /// Notification delivery errors. Best-effort; never joined into the
    /// caller's error path.
    #[error("notification error: {message}")]
    Notification { message: String },

    /// A session references a conversation state missing from the active
    /// flow definition (e.g. a stale session after a flow was retired).
    #[error("unknown conversation state: {state}")]
    UnknownState { state: String },

    /// A transition was requested to a state absent from the current
    /// state's allowed transitions.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Operation timed out. Not raised by the built-in pipeline; reserved
    /// for adapter implementations that enforce their own deadlines.
    /// Classified as transient, so the engine's retry loop covers it.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CharlaError {
    /// True for errors that may succeed on a later attempt (provider,
    /// embedding, media). Used by the engine's bounded retry loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CharlaError::Provider { .. }
                | CharlaError::Embedding { .. }
                | CharlaError::Media { .. }
                | CharlaError::Timeout { .. }
        )
    }
}
