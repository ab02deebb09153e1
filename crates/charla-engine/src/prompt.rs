// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt assembly.
//!
//! The prompt mandates the structured JSON reply contract the parser
//! expects; keep the two in sync when either changes.

use charla_storage::models::{ConversationExample, KnowledgeEntry};

/// Everything that feeds one system prompt.
pub struct PromptInputs<'a> {
    pub persona: Option<&'a str>,
    pub language: &'a str,
    pub state_name: &'a str,
    pub state_objective: &'a str,
    pub state_description: &'a str,
    /// Rendered transition options from the state machine, if available.
    pub transition_context: Option<&'a str>,
    pub knowledge: &'a [KnowledgeEntry],
    pub examples: &'a [ConversationExample],
    /// Accumulated session context map, rendered as JSON.
    pub session_context: Option<&'a str>,
}

pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::new();

    if let Some(persona) = inputs.persona {
        prompt.push_str(persona);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "Reply in the user's language (default: {}). Keep each message short and \
         conversational, as you would over a messaging app.\n\n",
        inputs.language
    ));

    prompt.push_str(&format!(
        "## Current conversation state: {}\nObjective: {}\n",
        inputs.state_name, inputs.state_objective
    ));
    if !inputs.state_description.is_empty() {
        prompt.push_str(inputs.state_description);
        prompt.push('\n');
    }
    if let Some(context) = inputs.transition_context {
        prompt.push('\n');
        prompt.push_str(context);
    }

    if let Some(session_context) = inputs.session_context {
        prompt.push_str(&format!(
            "\n## Known facts about this conversation\n{session_context}\n"
        ));
    }

    if !inputs.knowledge.is_empty() {
        prompt.push_str("\n## Relevant knowledge\n");
        for entry in inputs.knowledge {
            prompt.push_str(&format!("### {}\n{}\n", entry.title, entry.content));
        }
    }

    if !inputs.examples.is_empty() {
        prompt.push_str("\n## Reference conversations\n");
        for example in inputs.examples {
            prompt.push_str(&format!(
                "Scenario: {} (outcome: {})\n{}\n",
                example.scenario,
                example.outcome,
                render_example_messages(&example.messages)
            ));
        }
    }

    prompt.push_str(REPLY_CONTRACT);
    prompt
}

/// The JSON contract appended to every conversational system prompt.
const REPLY_CONTRACT: &str = r#"
## Reply format
Respond with a single JSON object, no prose outside it:
{
  "responses": ["2 to 4 short message chunks"],
  "transition": {"to_state": "name", "confidence": 0.0, "reason": "why"},
  "escalation": {"reason": "why a human is needed"},
  "extracted_data": {"field": "value"},
  "uncertain": false
}
"responses" is required. "transition", "escalation", and "extracted_data"
are optional; omit them when not applicable. Only recommend transitions
listed above. Set "uncertain" to true when you are guessing.
"#;

/// Render the stored role-tagged message array as a compact transcript.
/// Malformed rows are skipped; the example is advisory, not load-bearing.
fn render_example_messages(messages_json: &str) -> String {
    let Ok(messages) = serde_json::from_str::<Vec<serde_json::Value>>(messages_json) else {
        return String::new();
    };
    let mut out = String::new();
    for message in messages {
        let (Some(role), Some(content)) = (
            message.get("role").and_then(|v| v.as_str()),
            message.get("content").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        out.push_str(&format!("{role}: {content}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_every_section() {
        let knowledge = vec![KnowledgeEntry {
            id: "k1".to_string(),
            category: "pricing".to_string(),
            title: "Pro plan".to_string(),
            content: "The pro plan costs $49/month.".to_string(),
            embedding: "[]".to_string(),
        }];
        let examples = vec![ConversationExample {
            id: "e1".to_string(),
            scenario: "price question".to_string(),
            category: "happy_path".to_string(),
            outcome: "qualified".to_string(),
            primary_state: "qualifying".to_string(),
            state_flow: "[]".to_string(),
            messages: r#"[{"role":"user","content":"how much?"},{"role":"assistant","content":"$49"}]"#
                .to_string(),
        }];

        let prompt = build_system_prompt(&PromptInputs {
            persona: Some("You are Mari, the sales assistant for Acme."),
            language: "es",
            state_name: "qualifying",
            state_objective: "Collect budget",
            state_description: "",
            transition_context: Some("Available transitions from the current state:\n- closing\n"),
            knowledge: &knowledge,
            examples: &examples,
            session_context: Some(r#"{"budget":"500"}"#),
        });

        assert!(prompt.contains("Mari"));
        assert!(prompt.contains("qualifying"));
        assert!(prompt.contains("$49/month"));
        assert!(prompt.contains("user: how much?"));
        assert!(prompt.contains(r#""budget":"500""#));
        assert!(prompt.contains("\"responses\" is required"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let prompt = build_system_prompt(&PromptInputs {
            persona: None,
            language: "en",
            state_name: "greeting",
            state_objective: "Welcome the user",
            state_description: "",
            transition_context: None,
            knowledge: &[],
            examples: &[],
            session_context: None,
        });
        assert!(!prompt.contains("Relevant knowledge"));
        assert!(!prompt.contains("Reference conversations"));
        assert!(!prompt.contains("Known facts"));
        assert!(prompt.contains("Reply format"));
    }

    #[test]
    fn malformed_example_messages_render_empty() {
        assert_eq!(render_example_messages("not json"), "");
        assert_eq!(render_example_messages(r#"[{"role":"user"}]"#), "");
    }
}
