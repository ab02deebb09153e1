// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./charla.toml` > `~/.config/charla/charla.toml` >
//! `/etc/charla/charla.toml` with environment variable overrides via the
//! `CHARLA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CharlaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/charla/charla.toml` (system-wide)
/// 3. `~/.config/charla/charla.toml` (user XDG config)
/// 4. `./charla.toml` (local directory)
/// 5. `CHARLA_*` environment variables
pub fn load_config() -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::file("/etc/charla/charla.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("charla/charla.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("charla.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CharlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CharlaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CHARLA_BUFFER_MAX_RETRIES` must map to
/// `buffer.max_retries`, not `buffer.max.retries`.
fn env_provider() -> Env {
    Env::prefixed("CHARLA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("buffer_", "buffer.", 1)
            .replacen("engine_", "engine.", 1)
            .replacen("followup_", "followup.", 1)
            .replacen("escalation_", "escalation.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_str_applies_overrides() {
        let config = load_config_from_str(
            r#"
            [agent]
            name = "sales-bot"
            language = "es"

            [buffer]
            debounce_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.name, "sales-bot");
        assert_eq!(config.agent.language, "es");
        assert_eq!(config.buffer.debounce_ms, 5000);
        // Untouched sections keep defaults.
        assert_eq!(config.engine.history_limit, 10);
    }

    #[test]
    fn load_from_str_rejects_unknown_section_keys() {
        let result = load_config_from_str(
            r#"
            [engine]
            retry_atempts = 5
            "#,
        );
        assert!(result.is_err());
    }
}
