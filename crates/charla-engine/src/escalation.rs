// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic escalation triggers.
//!
//! Two ordered pattern sets are scanned before any model call: explicit
//! human-handoff requests, then frustration and fraud accusations. First
//! match wins and short-circuits the rest of the pipeline, so a user who
//! asks for a person never gets an automated sales reply.

use std::sync::OnceLock;

use regex::RegexSet;

/// Why a message tripped a deterministic trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationTrigger {
    pub reason: String,
    pub confidence: f32,
}

fn handoff_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)\b(talk|speak|chat)\s+(to|with)\s+(a\s+)?(human|person|agent|representative|someone real)\b",
            r"(?i)\b(real|actual)\s+(human|person)\b",
            r"(?i)\bhuman\s+agent\b",
            r"(?i)\bcustomer\s+(service|support)\s+(rep|representative|agent)\b",
            r"(?i)\bquiero\s+hablar\s+con\s+(una?\s+)?(persona|humano|agente)\b",
            r"(?i)\bfalar\s+com\s+(uma?\s+)?(pessoa|humano|atendente)\b",
            r"(?i)\bstop\s+(the\s+)?bot\b",
            r"(?i)\bno\s+(more\s+)?bots?\b",
        ])
        .expect("handoff patterns compile")
    })
}

fn frustration_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)\bthis\s+is\s+(ridiculous|useless|a\s+joke)\b",
            r"(?i)\b(scam|scammers?|fraud|estafa|golpe|fraude)\b",
            r"(?i)\byou\s+(stole|took)\s+my\s+money\b",
            r"(?i)\b(robaron|me\s+robaron)\b",
            r"(?i)\b(terrible|horrible|worst)\s+(service|support|experience)\b",
            r"(?i)\bi\s+want\s+(a\s+)?refund\s+now\b",
            r"(?i)\b(report|reporting)\s+you\b",
        ])
        .expect("frustration patterns compile")
    })
}

/// Scan text against the trigger sets in priority order.
pub fn check_escalation_triggers(text: &str) -> Option<EscalationTrigger> {
    if handoff_set().is_match(text) {
        return Some(EscalationTrigger {
            reason: "user requested human handoff".to_string(),
            confidence: 1.0,
        });
    }
    if frustration_set().is_match(text) {
        return Some(EscalationTrigger {
            reason: "user expressed frustration or accused fraud".to_string(),
            confidence: 0.9,
        });
    }
    None
}
