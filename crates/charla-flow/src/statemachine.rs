// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative conversation state machine.
//!
//! A flow definition is pure data (JSON stored in the `flows` table), so
//! conversational behavior changes by activating a new version, not by
//! shipping code. The machine itself only validates and describes
//! transitions; deciding WHEN to transition is the model's job, gated by
//! the engine's confidence threshold.

use std::collections::BTreeMap;

use charla_core::time::now_ts;
use charla_core::CharlaError;
use serde::{Deserialize, Serialize};

/// One step of a state's follow-up sequence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FollowupStep {
    /// Human-readable delay such as "15m", "2h", "1d".
    pub interval: String,
    /// Name of the follow-up message config to render.
    pub config_name: String,
}

/// Per-state configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StateConfig {
    /// What the agent is trying to accomplish in this state.
    pub objective: String,

    /// Longer description injected into the system prompt.
    #[serde(default)]
    pub description: String,

    /// Signals the model should watch for to consider the state complete.
    #[serde(default)]
    pub completion_signals: Vec<String>,

    /// Knowledge-base categories searched for grounding in this state.
    #[serde(default)]
    pub rag_categories: Vec<String>,

    /// States reachable from here. Empty means terminal.
    #[serde(default)]
    pub allowed_transitions: Vec<String>,

    /// Per-target guidance on when each transition applies.
    #[serde(default)]
    pub transition_guidance: BTreeMap<String, String>,

    /// Soft ceiling on messages spent in this state; surfaced to the model
    /// as a nudge, never enforced mechanically.
    #[serde(default)]
    pub max_messages: Option<u32>,

    /// Follow-ups fired while the conversation idles in this state.
    #[serde(default)]
    pub followup_sequence: Vec<FollowupStep>,
}

/// A complete, named flow: initial state plus the state table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowDefinition {
    pub initial_state: String,
    pub states: BTreeMap<String, StateConfig>,
}

impl FlowDefinition {
    /// Parse a JSON definition (the `flows.definition` column).
    pub fn from_json(json: &str) -> Result<Self, CharlaError> {
        let definition: Self = serde_json::from_str(json)
            .map_err(|e| CharlaError::Config(format!("invalid flow definition: {e}")))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Referential integrity: the initial state and every transition target
    /// must exist in the state table.
    pub fn validate(&self) -> Result<(), CharlaError> {
        if !self.states.contains_key(&self.initial_state) {
            return Err(CharlaError::Config(format!(
                "flow initial state '{}' is not defined",
                self.initial_state
            )));
        }
        for (name, state) in &self.states {
            for target in &state.allowed_transitions {
                if !self.states.contains_key(target) {
                    return Err(CharlaError::Config(format!(
                        "state '{name}' allows transition to undefined state '{target}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A validated state change, recorded in session metadata.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    pub reason: String,
    pub timestamp: String,
}

/// Runtime wrapper over a validated flow definition.
#[derive(Debug, Clone)]
pub struct StateMachine {
    definition: FlowDefinition,
}

impl StateMachine {
    pub fn new(definition: FlowDefinition) -> Result<Self, CharlaError> {
        definition.validate()?;
        Ok(Self { definition })
    }

    pub fn from_json(json: &str) -> Result<Self, CharlaError> {
        Ok(Self {
            definition: FlowDefinition::from_json(json)?,
        })
    }

    pub fn initial_state(&self) -> &str {
        &self.definition.initial_state
    }

    /// Config for a named state. A stale session can reference a state the
    /// active flow version no longer has.
    pub fn config(&self, state: &str) -> Result<&StateConfig, CharlaError> {
        self.definition
            .states
            .get(state)
            .ok_or_else(|| CharlaError::UnknownState {
                state: state.to_string(),
            })
    }

    /// Whether `to` is a legal target from `from`.
    pub fn can_transition_to(&self, from: &str, to: &str) -> Result<bool, CharlaError> {
        let config = self.config(from)?;
        Ok(config.allowed_transitions.iter().any(|t| t == to))
    }

    /// Validate and record a transition. The caller applies the record to
    /// the session; the machine holds no per-session state.
    pub fn transition_to(
        &self,
        from: &str,
        to: &str,
        reason: &str,
    ) -> Result<TransitionRecord, CharlaError> {
        if !self.can_transition_to(from, to)? {
            return Err(CharlaError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        // Target must also resolve; allowed_transitions is validated against
        // the state table at load, so this is unreachable for loaded flows.
        self.config(to)?;
        Ok(TransitionRecord {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
            timestamp: now_ts(),
        })
    }

    /// Render the transition options for the system prompt: each legal
    /// target with its guidance, plus this state's completion signals.
    pub fn build_transition_context(&self, state: &str) -> Result<String, CharlaError> {
        let config = self.config(state)?;
        let mut out = String::new();
        if config.allowed_transitions.is_empty() {
            out.push_str("This is a terminal state. Do not recommend a transition.\n");
            return Ok(out);
        }
        out.push_str("Available transitions from the current state:\n");
        for target in &config.allowed_transitions {
            match config.transition_guidance.get(target) {
                Some(guidance) => out.push_str(&format!("- {target}: {guidance}\n")),
                None => out.push_str(&format!("- {target}\n")),
            }
        }
        if !config.completion_signals.is_empty() {
            out.push_str("Signals that the current state's objective is complete:\n");
            for signal in &config.completion_signals {
                out.push_str(&format!("- {signal}\n"));
            }
        }
        if let Some(max) = config.max_messages {
            out.push_str(&format!(
                "Aim to complete this state within roughly {max} messages.\n"
            ));
        }
        Ok(out)
    }
}
