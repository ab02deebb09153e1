// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, including the claim-lease constraint: the engine's full retry
//! sequence must finish well inside the buffer's zombie threshold, otherwise
//! a slow retry run gets its own lock swept out from under it.

use crate::diagnostic::ConfigError;
use crate::model::CharlaConfig;

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CharlaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !VALID_LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level must be one of {VALID_LOG_LEVELS:?}, got `{}`",
                config.agent.log_level
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if !(0.0..=2.0).contains(&config.provider.temperature) {
        errors.push(ConfigError::Validation {
            message: format!(
                "provider.temperature must be in [0.0, 2.0], got {}",
                config.provider.temperature
            ),
        });
    }

    if config.provider.max_tokens == 0 {
        errors.push(ConfigError::Validation {
            message: "provider.max_tokens must be positive".to_string(),
        });
    }

    if config.buffer.debounce_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "buffer.debounce_ms must be positive".to_string(),
        });
    }

    if config.engine.history_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.history_limit must be positive".to_string(),
        });
    }

    if config.engine.retry_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.retry_attempts must be at least 1".to_string(),
        });
    }

    if !(0.0..=1.0).contains(&config.engine.transition_confidence_threshold) {
        errors.push(ConfigError::Validation {
            message: format!(
                "engine.transition_confidence_threshold must be in [0.0, 1.0], got {}",
                config.engine.transition_confidence_threshold
            ),
        });
    }

    // The worst-case retry sequence must stay under half the zombie
    // threshold, or the cleanup sweep can release a lock still in use.
    let worst_case_retry_ms =
        u64::from(config.engine.retry_attempts) * config.engine.retry_delay_ms;
    let zombie_ms = config.buffer.zombie_threshold_secs * 1000;
    if worst_case_retry_ms >= zombie_ms / 2 {
        errors.push(ConfigError::Validation {
            message: format!(
                "engine.retry_attempts ({}) x engine.retry_delay_ms ({}) = {}ms must stay \
                 under half of buffer.zombie_threshold_secs ({}s)",
                config.engine.retry_attempts,
                config.engine.retry_delay_ms,
                worst_case_retry_ms,
                config.buffer.zombie_threshold_secs
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
