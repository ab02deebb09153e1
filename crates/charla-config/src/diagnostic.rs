// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Miette diagnostics for configuration errors.

use miette::Diagnostic;
use thiserror::Error;

/// A configuration error suitable for terminal rendering.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A parse/deserialization error reported by Figment.
    #[error("failed to parse configuration: {message}")]
    #[diagnostic(
        code(charla::config::parse),
        help("check charla.toml against the documented keys; unknown keys are rejected")
    )]
    Parse { message: String },

    /// A semantic validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(charla::config::validation))]
    Validation { message: String },
}

/// Render collected configuration errors to stderr using miette's
/// fancy reporter.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        let report = miette::Report::msg(format!("{error}"));
        eprintln!("{report:?}");
        if let Some(help) = error.help() {
            eprintln!("  help: {help}");
        }
    }
    eprintln!(
        "error: configuration invalid ({} issue{})",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
}
