// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Charla conversation backend.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Charla configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CharlaConfig {
    /// Agent identity and persona settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// LLM provider call settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Message buffer (debounce / claim / dead-letter) settings.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Conversation engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Follow-up scheduler settings.
    #[serde(default)]
    pub followup: FollowupConfig,

    /// Escalation alerting settings.
    #[serde(default)]
    pub escalation: EscalationConfig,
}

/// Agent identity and persona configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Business persona injected into every system prompt.
    #[serde(default)]
    pub persona: Option<String>,

    /// Path to a markdown file containing the persona.
    /// Takes precedence over `persona` if both are set.
    #[serde(default)]
    pub persona_file: Option<String>,

    /// Default conversation language (BCP 47-ish short code).
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            persona: None,
            persona_file: None,
            language: default_language(),
        }
    }
}

fn default_agent_name() -> String {
    "charla".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "charla.db".to_string()
}

/// LLM provider call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Model identifier passed through to the provider adapter.
    #[serde(default = "default_model")]
    pub model: String,

    /// Fixed sampling temperature for conversation replies.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token ceiling per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "primary".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// Message buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Debounce window: delay after the most recent message in a burst
    /// before the group is eligible for processing.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Dead-letter ceiling: a group is permanently excluded once its
    /// retry count reaches this value.
    #[serde(default = "default_buffer_max_retries")]
    pub max_retries: u32,

    /// Age after which a held claim lock is considered abandoned and
    /// released by the cleanup sweep.
    #[serde(default = "default_zombie_threshold_secs")]
    pub zombie_threshold_secs: u64,

    /// How often the worker polls for mature sessions.
    #[serde(default = "default_buffer_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often the independent cleanup sweep runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_retries: default_buffer_max_retries(),
            zombie_threshold_secs: default_zombie_threshold_secs(),
            poll_interval_ms: default_buffer_poll_interval_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    8000
}

fn default_buffer_max_retries() -> u32 {
    3
}

fn default_zombie_threshold_secs() -> u64 {
    300
}

fn default_buffer_poll_interval_ms() -> u64 {
    1000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

/// Conversation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Flow assigned to newly created sessions.
    #[serde(default = "default_flow")]
    pub default_flow: String,

    /// Number of recent messages loaded as conversation history.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Model-call attempt ceiling when the reply is unusable.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between model-call attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Idle time after which an escalated session auto-resumes.
    #[serde(default = "default_escalation_hold_secs")]
    pub escalation_hold_secs: u64,

    /// Minimum reported confidence for applying a transition recommendation.
    #[serde(default = "default_transition_confidence")]
    pub transition_confidence_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_flow: default_flow(),
            history_limit: default_history_limit(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            escalation_hold_secs: default_escalation_hold_secs(),
            transition_confidence_threshold: default_transition_confidence(),
        }
    }
}

fn default_flow() -> String {
    "sales".to_string()
}

fn default_history_limit() -> u32 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_escalation_hold_secs() -> u64 {
    3600
}

fn default_transition_confidence() -> f32 {
    0.6
}

/// Follow-up scheduler configuration.
///
/// The retry ceiling here is independent from the buffer's.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FollowupConfig {
    /// Dead-letter ceiling for follow-up queue items.
    #[serde(default = "default_followup_max_retries")]
    pub max_retries: u32,

    /// How often the scheduler polls for due items.
    #[serde(default = "default_followup_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Age after which a held follow-up claim is released.
    #[serde(default = "default_zombie_threshold_secs")]
    pub zombie_threshold_secs: u64,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            max_retries: default_followup_max_retries(),
            poll_interval_secs: default_followup_poll_interval_secs(),
            zombie_threshold_secs: default_zombie_threshold_secs(),
        }
    }
}

fn default_followup_max_retries() -> u32 {
    3
}

fn default_followup_poll_interval_secs() -> u64 {
    60
}

/// Escalation alerting configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Destination for escalation alerts (e.g. an ops group id).
    /// Alerts are skipped when unset.
    #[serde(default)]
    pub alert_destination: Option<String>,
}
