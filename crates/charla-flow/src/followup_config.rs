// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Follow-up message configs: a body template plus named variable bindings.
//!
//! Bindings resolve from three sources: literals, dot-notation paths into
//! the session/contact JSON, and model prompts. Prompt bindings cannot be
//! resolved here; [`resolve_static`] returns them to the caller, which
//! fills them with a model call at send time.

use std::collections::BTreeMap;

use charla_core::CharlaError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How one template variable obtains its value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableBinding {
    /// Fixed string.
    Literal { value: String },
    /// Dot-notation path into the resolution root
    /// (e.g. "contact.name", "context.budget").
    Path { path: String },
    /// Generated by the model at send time.
    Prompt { prompt: String },
}

/// A named follow-up message definition (the `followup_configs` table).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FollowupMessageConfig {
    /// Body with `{{variable}}` placeholders.
    pub body: String,

    #[serde(default)]
    pub variables: BTreeMap<String, VariableBinding>,
}

impl FollowupMessageConfig {
    pub fn from_json(json: &str) -> Result<Self, CharlaError> {
        serde_json::from_str(json)
            .map_err(|e| CharlaError::Config(format!("invalid follow-up config: {e}")))
    }

    /// Resolve literal and path bindings against `root`. Returns the
    /// resolved values and the prompt bindings still needing a model call.
    /// Unresolvable paths become empty strings rather than failing the send.
    pub fn resolve_static(
        &self,
        root: &serde_json::Value,
    ) -> (BTreeMap<String, String>, Vec<(String, String)>) {
        let mut resolved = BTreeMap::new();
        let mut prompts = Vec::new();
        for (name, binding) in &self.variables {
            match binding {
                VariableBinding::Literal { value } => {
                    resolved.insert(name.clone(), value.clone());
                }
                VariableBinding::Path { path } => {
                    resolved.insert(name.clone(), lookup_path(root, path).unwrap_or_default());
                }
                VariableBinding::Prompt { prompt } => {
                    prompts.push((name.clone(), prompt.clone()));
                }
            }
        }
        (resolved, prompts)
    }
}

/// Walk a dot-notation path into a JSON value, rendering the leaf as a
/// bare string (no quotes around JSON strings).
pub fn lookup_path(root: &serde_json::Value, path: &str) -> Option<String> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").unwrap())
}

/// Replace `{{name}}` placeholders with bound values. Unbound placeholders
/// render as empty strings so a missing variable never leaks template
/// syntax to the user.
pub fn render_template(template: &str, variables: &BTreeMap<String, String>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            variables.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
