// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Charla conversation engine: escalation triggers, retrieval, prompt
//! assembly, structured-reply parsing, and the processing pipeline.

pub mod engine;
pub mod escalation;
pub mod parser;
pub mod prompt;
pub mod retrieval;

pub use engine::{BotResponse, ConversationEngine, EngineDeps, EngineOutput};
pub use escalation::{check_escalation_triggers, EscalationTrigger};
pub use parser::{parse_model_reply, ParsedReply, TransitionRecommendation};
