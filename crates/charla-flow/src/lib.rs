// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation flow layer: the declarative state machine, interval
//! parsing, follow-up message configs, and the follow-up scheduler.

pub mod followup_config;
pub mod interval;
pub mod scheduler;
pub mod statemachine;

pub use followup_config::{render_template, FollowupMessageConfig, VariableBinding};
pub use interval::{calculate_scheduled_time, parse_interval_to_minutes};
pub use scheduler::{FollowupScheduler, ScheduledFollowup};
pub use statemachine::{FlowDefinition, FollowupStep, StateConfig, StateMachine, TransitionRecord};
