// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Charla conversation backend.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, environment variable
//! overrides, and miette diagnostic rendering.
//!
//! # Usage
//!
//! ```no_run
//! use charla_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("agent: {}", config.agent.name);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CharlaConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// 1. Loads config from TOML files + env vars via Figment
/// 2. On success: runs post-deserialization validation
/// 3. On Figment error: converts to a diagnostic error
pub fn load_and_validate() -> Result<CharlaConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(mut config) => {
            validation::validate_config(&config)?;
            resolve_persona_file(&mut config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Parse {
            message: err.to_string(),
        }]),
    }
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<CharlaConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(mut config) => {
            validation::validate_config(&config)?;
            resolve_persona_file(&mut config)?;
            Ok(config)
        }
        Err(err) => Err(vec![ConfigError::Parse {
            message: err.to_string(),
        }]),
    }
}

/// Substitute `agent.persona` with the contents of `agent.persona_file`
/// when the latter is set. An unreadable path is a configuration error,
/// not a silent fallback to the inline persona.
fn resolve_persona_file(config: &mut CharlaConfig) -> Result<(), Vec<ConfigError>> {
    let Some(path) = &config.agent.persona_file else {
        return Ok(());
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            config.agent.persona = Some(contents.trim_end().to_string());
            Ok(())
        }
        Err(err) => Err(vec![ConfigError::Validation {
            message: format!("agent.persona_file `{path}` is unreadable: {err}"),
        }]),
    }
}
