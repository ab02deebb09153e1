// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered parsing of structured model replies.
//!
//! The model is asked for a JSON contract but cannot be trusted to honor
//! it. Parsing is an ordered chain of strategies, strictest first, and the
//! pipeline short-circuits on the first success. A non-empty textual
//! response is the only hard requirement; everything else is optional
//! metadata.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

/// Transition recommendation carried in a structured reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransitionRecommendation {
    pub to_state: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reason: String,
}

/// Escalation recommendation carried in a structured reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EscalationRecommendation {
    #[serde(default)]
    pub reason: String,
}

/// The model's reply after parsing, whichever strategy succeeded.
#[derive(Debug, Clone, Default)]
pub struct ParsedReply {
    /// Ordered message chunks; non-empty on any successful parse.
    pub responses: Vec<String>,
    pub transition: Option<TransitionRecommendation>,
    pub escalation: Option<EscalationRecommendation>,
    /// Extracted facts to merge into the session context.
    pub extracted_data: Option<serde_json::Map<String, serde_json::Value>>,
    pub uncertain: bool,
}

/// Raw deserialization target; both "response" and "responses" spellings
/// appear in the wild, as do bare-string responses.
#[derive(Debug, Deserialize)]
struct RawReply {
    #[serde(default, alias = "response")]
    responses: ResponseField,
    #[serde(default)]
    transition: Option<TransitionRecommendation>,
    #[serde(default)]
    escalation: Option<EscalationRecommendation>,
    #[serde(default)]
    extracted_data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    uncertain: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
enum ResponseField {
    #[default]
    Missing,
    One(String),
    Many(Vec<String>),
}

impl ResponseField {
    fn into_vec(self) -> Vec<String> {
        match self {
            ResponseField::Missing => Vec::new(),
            ResponseField::One(s) => vec![s],
            ResponseField::Many(v) => v,
        }
    }
}

impl RawReply {
    fn into_parsed(self) -> Option<ParsedReply> {
        let responses: Vec<String> = self
            .responses
            .into_vec()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if responses.is_empty() {
            return None;
        }
        Some(ParsedReply {
            responses,
            transition: self.transition,
            escalation: self.escalation,
            extracted_data: self.extracted_data,
            uncertain: self.uncertain,
        })
    }
}

/// Parse model output through the strategy chain. Returns `None` only when
/// no strategy can produce any usable text (an empty raw reply).
pub fn parse_model_reply(raw: &str) -> Option<ParsedReply> {
    if let Some(parsed) = parse_fenced_json(raw) {
        return Some(parsed);
    }
    if let Some(parsed) = parse_bracket_match(raw) {
        debug!("structured reply recovered via bracket match");
        return Some(parsed);
    }
    if let Some(parsed) = salvage_response_field(raw) {
        debug!("structured reply salvaged via field regex");
        return Some(parsed);
    }
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    debug!("model reply treated as plain text");
    Some(ParsedReply {
        responses: vec![text.to_string()],
        ..ParsedReply::default()
    })
}

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Strategy (a): a fenced ```json block, or the raw text itself if it is a
/// complete JSON object.
fn parse_fenced_json(raw: &str) -> Option<ParsedReply> {
    let candidate = fenced_re()
        .captures(raw)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| raw.trim().to_string());
    let reply: RawReply = serde_json::from_str(&candidate).ok()?;
    reply.into_parsed()
}

/// Strategy (b): find the outermost balanced `{...}` containing a
/// response(s) key and try to parse that slice.
fn parse_bracket_match(raw: &str) -> Option<ParsedReply> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let slice = &raw[start..start + offset + ch.len_utf8()];
                    if !slice.contains("\"response") {
                        return None;
                    }
                    let reply: RawReply = serde_json::from_str(slice).ok()?;
                    return reply.into_parsed();
                }
            }
            _ => {}
        }
    }
    None
}

fn salvage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Matches "response"/"responses" followed by a string or array of
    // strings, tolerant of truncation after the first complete literal.
    RE.get_or_init(|| {
        Regex::new(r#""responses?"\s*:\s*(?:\[\s*)?"((?:[^"\\]|\\.)*)""#).unwrap()
    })
}

/// Strategy (c): regex-extract the first response string literal even from
/// truncated JSON, unescaping standard sequences.
fn salvage_response_field(raw: &str) -> Option<ParsedReply> {
    let caps = salvage_re().captures(raw)?;
    let text = unescape_json_string(&caps[1]);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(ParsedReply {
        responses: vec![text.to_string()],
        ..ParsedReply::default()
    })
}

fn unescape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                if let Some(c) = u32::from_str_radix(&code, 16)
                    .ok()
                    .and_then(char::from_u32)
                {
                    out.push(c);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_block_parses_fully() {
        let raw = r#"Sure, here you go:
```json
{
  "responses": ["Hola!", "¿En qué puedo ayudarte?"],
  "transition": {"to_state": "qualifying", "confidence": 0.8, "reason": "buying intent"},
  "extracted_data": {"budget": "500"},
  "uncertain": false
}
```"#;
        let parsed = parse_model_reply(raw).unwrap();
        assert_eq!(parsed.responses.len(), 2);
        let transition = parsed.transition.unwrap();
        assert_eq!(transition.to_state, "qualifying");
        assert!((transition.confidence - 0.8).abs() < 1e-6);
        assert_eq!(
            parsed.extracted_data.unwrap().get("budget").unwrap(),
            "500"
        );
    }

    #[test]
    fn bare_json_object_parses_without_fences() {
        let raw = r#"{"response": "Just one chunk", "uncertain": true}"#;
        let parsed = parse_model_reply(raw).unwrap();
        assert_eq!(parsed.responses, vec!["Just one chunk"]);
        assert!(parsed.uncertain);
    }

    #[test]
    fn bracket_match_skips_leading_prose() {
        let raw = r#"Here is my answer in the requested format.
{"responses": ["Chunk A", "Chunk B"], "escalation": {"reason": "user is angry"}} trailing text"#;
        let parsed = parse_model_reply(raw).unwrap();
        assert_eq!(parsed.responses, vec!["Chunk A", "Chunk B"]);
        assert_eq!(parsed.escalation.unwrap().reason, "user is angry");
    }

    #[test]
    fn salvage_recovers_from_truncated_json() {
        let raw = r#"{"responses": ["We ship in 3 days, \"usually\".", "and the"#;
        let parsed = parse_model_reply(raw).unwrap();
        assert_eq!(parsed.responses.len(), 1);
        assert!(parsed.responses[0].contains("\"usually\""));
        assert!(parsed.transition.is_none());
    }

    #[test]
    fn raw_text_is_the_last_resort() {
        let parsed = parse_model_reply("I can help with that directly.").unwrap();
        assert_eq!(parsed.responses, vec!["I can help with that directly."]);
    }

    #[test]
    fn empty_output_fails_every_strategy() {
        assert!(parse_model_reply("").is_none());
        assert!(parse_model_reply("   \n  ").is_none());
        assert!(parse_model_reply(r#"{"responses": []}"#).is_none());
        assert!(parse_model_reply(r#"{"responses": ["  "]}"#).is_none());
    }

    #[test]
    fn whitespace_chunks_are_dropped() {
        let parsed = parse_model_reply(r#"{"responses": ["real", "  "]}"#).unwrap();
        assert_eq!(parsed.responses, vec!["real"]);
    }
}
