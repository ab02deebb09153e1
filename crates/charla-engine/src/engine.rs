// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation processing pipeline.
//!
//! `process_batch` consumes one claimed, coalesced group of inbound
//! messages and runs the full pass: media enrichment, identity resolution,
//! escalation checks, retrieval, the model call with bounded retry, and
//! persistence of replies and session mutations. The claim lock held by
//! the caller guarantees this is the only invocation touching the session.

use std::sync::Arc;

use charla_config::model::CharlaConfig;
use charla_core::time::{format_ts, now_ts, parse_ts};
use charla_core::traits::{
    EmbeddingAdapter, MediaAdapter, NotifierAdapter, ProviderAdapter, UsageLogger,
};
use charla_core::types::{
    truncate_preview, ChatMessage, EscalationAlert, InboundMessage, MediaKind, ProviderReply,
    TokenUsage, UsageEntry,
};
use charla_core::CharlaError;
use charla_flow::statemachine::{StateConfig, StateMachine, TransitionRecord};
use charla_flow::{render_template, FollowupMessageConfig};
use charla_storage::models::{Contact, Session, StoredMessage};
use charla_storage::queries::{contacts, flows, followups, messages, sessions};
use charla_storage::Database;
use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::escalation::check_escalation_triggers;
use crate::parser::{parse_model_reply, ParsedReply};
use crate::prompt::{build_system_prompt, PromptInputs};
use crate::retrieval::{retrieve_examples, retrieve_knowledge};

const PREVIEW_CHARS: usize = 200;
const VARIABLE_MAX_TOKENS: u32 = 100;

// Rough blended pricing used for the usage ledger; not billing-grade.
const COST_PER_MTOK_INPUT: f64 = 3.0;
const COST_PER_MTOK_OUTPUT: f64 = 15.0;

/// Collaborators injected into the engine.
pub struct EngineDeps {
    pub provider: Arc<dyn ProviderAdapter>,
    pub embedder: Arc<dyn EmbeddingAdapter>,
    pub media: Arc<dyn MediaAdapter>,
    pub notifier: Option<Arc<dyn NotifierAdapter>>,
    pub usage_logger: Arc<dyn UsageLogger>,
}

/// One outbound message chunk.
#[derive(Debug, Clone)]
pub struct BotResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub transition: Option<TransitionRecord>,
}

/// Result of one processing pass.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub session_id: String,
    pub responses: Vec<BotResponse>,
    pub escalated: bool,
    pub transition: Option<TransitionRecord>,
}

pub struct ConversationEngine {
    db: Database,
    config: CharlaConfig,
    deps: EngineDeps,
}

impl ConversationEngine {
    pub fn new(db: Database, config: CharlaConfig, deps: EngineDeps) -> Self {
        Self { db, config, deps }
    }

    /// Process one claimed batch, ordered by arrival. All messages share a
    /// session key; the batch is answered with a single model pass.
    pub async fn process_batch(
        &self,
        batch: &[InboundMessage],
    ) -> Result<EngineOutput, CharlaError> {
        let first = batch
            .first()
            .ok_or_else(|| CharlaError::Internal("empty batch".to_string()))?;

        let enriched: Vec<String> = {
            let mut texts = Vec::with_capacity(batch.len());
            for message in batch {
                texts.push(self.enrich_media(message).await);
            }
            texts
        };
        let combined_text = enriched.join("\n");

        let contact = self.find_or_create_contact(first).await?;
        let mut session = self.find_or_create_session(first, &contact).await?;
        let language = contact
            .language
            .clone()
            .unwrap_or_else(|| self.config.agent.language.clone());

        // The user re-engaged: pending proactive messages are stale, and
        // the follow-up sequence restarts for whatever state we end up in.
        followups::cancel_pending(&self.db, &session.id).await?;
        session.followup_index = -1;

        if session.escalated {
            let idle_secs = self.idle_seconds(&session);
            if idle_secs < self.config.engine.escalation_hold_secs as i64 {
                debug!(
                    session_id = %session.id,
                    idle_secs,
                    "escalation hold active, message stored without reply"
                );
                self.persist_inbound(&session, &enriched).await?;
                sessions::touch_last_message(&self.db, &session.id, &now_ts()).await?;
                return Ok(EngineOutput {
                    session_id: session.id.clone(),
                    escalated: true,
                    ..EngineOutput::default()
                });
            }
            info!(session_id = %session.id, idle_secs, "escalation hold expired, auto-resuming");
            sessions::clear_escalation(&self.db, &session.id, &now_ts()).await?;
            session.escalated = false;
            session.escalation_reason = None;
        }

        self.persist_inbound(&session, &enriched).await?;

        let history = messages::get_recent_messages(
            &self.db,
            &session.id,
            self.config.engine.history_limit,
        )
        .await?;
        let machine = self.load_state_machine(&session).await;
        let state_config = machine
            .as_ref()
            .and_then(|m| m.config(&session.current_state).ok().cloned())
            .unwrap_or_default();

        if let Some(trigger) = check_escalation_triggers(&combined_text) {
            return self
                .handle_escalation(
                    &mut session,
                    &contact,
                    &language,
                    &trigger.reason,
                    &combined_text,
                )
                .await;
        }

        let knowledge = retrieve_knowledge(
            &self.db,
            self.deps.embedder.as_ref(),
            &combined_text,
            &state_config.rag_categories,
        )
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "knowledge retrieval failed, continuing without grounding");
            Vec::new()
        });
        let examples = retrieve_examples(&self.db, &session.current_state)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "example retrieval failed, continuing without examples");
                Vec::new()
            });

        let transition_context = machine
            .as_ref()
            .and_then(|m| m.build_transition_context(&session.current_state).ok());
        let system_prompt = build_system_prompt(&PromptInputs {
            persona: self.config.agent.persona.as_deref(),
            language: &language,
            state_name: &session.current_state,
            state_objective: &state_config.objective,
            state_description: &state_config.description,
            transition_context: transition_context.as_deref(),
            knowledge: &knowledge,
            examples: &examples,
            session_context: session.context.as_deref(),
        });
        let chat: Vec<ChatMessage> = history
            .iter()
            .map(|m| ChatMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        let Some((parsed, usage)) = self.call_with_retry(&session, &system_prompt, &chat).await
        else {
            // Total model failure: one canned apology, no state mutation.
            let apology = canned_failure(&language);
            self.persist_outbound(&session.id, apology, None, None).await?;
            sessions::touch_last_message(&self.db, &session.id, &now_ts()).await?;
            return Ok(EngineOutput {
                session_id: session.id.clone(),
                responses: vec![BotResponse {
                    content: apology.to_string(),
                    usage: TokenUsage::default(),
                    transition: None,
                }],
                ..EngineOutput::default()
            });
        };

        if let Some(escalation) = &parsed.escalation {
            return self
                .handle_escalation(
                    &mut session,
                    &contact,
                    &language,
                    &escalation.reason,
                    &combined_text,
                )
                .await;
        }

        let transition = self.apply_transition(&machine, &mut session, &parsed);
        self.merge_context(&mut session, &parsed);

        let now = now_ts();
        session.last_message_at = Some(now.clone());
        session.updated_at = now;
        sessions::update_after_processing(&self.db, &session).await?;

        let mut responses = Vec::with_capacity(parsed.responses.len());
        for (i, chunk) in parsed.responses.iter().enumerate() {
            // Transition metadata rides on the first chunk only.
            let chunk_transition = if i == 0 { transition.clone() } else { None };
            self.persist_outbound(&session.id, chunk, Some(usage), chunk_transition.as_ref())
                .await?;
            responses.push(BotResponse {
                content: chunk.clone(),
                usage,
                transition: chunk_transition,
            });
        }

        Ok(EngineOutput {
            session_id: session.id.clone(),
            responses,
            escalated: false,
            transition,
        })
    }

    /// Build one proactive message for a due follow-up item. Returns `None`
    /// when the session is escalated or no longer active (skip, not fail).
    pub async fn generate_followup(
        &self,
        session_id: &str,
        config_name: &str,
    ) -> Result<Option<String>, CharlaError> {
        let Some(session) = sessions::get_session(&self.db, session_id).await? else {
            warn!(session_id, "follow-up for missing session skipped");
            return Ok(None);
        };
        if session.escalated || session.status != "active" {
            debug!(session_id, status = %session.status, "follow-up skipped");
            return Ok(None);
        }
        let Some(definition) = flows::get_followup_config(&self.db, config_name).await? else {
            return Err(CharlaError::Config(format!(
                "follow-up config '{config_name}' not found"
            )));
        };
        let config = FollowupMessageConfig::from_json(&definition)?;

        let contact = contacts::get_contact(&self.db, &session.contact_id).await?;
        let root = binding_root(&session, contact.as_ref());
        let (mut variables, prompts) = config.resolve_static(&root);
        for (name, prompt) in prompts {
            let value = self.generate_followup_variable(&session, &prompt).await?;
            variables.insert(name, value);
        }

        let body = render_template(&config.body, &variables);
        self.persist_outbound(&session.id, &body, None, None).await?;
        sessions::touch_last_message(&self.db, &session.id, &now_ts()).await?;
        info!(session_id, config_name, "follow-up generated");
        Ok(Some(body))
    }

    /// Resolve one dynamic follow-up variable with a short model call.
    pub async fn generate_followup_variable(
        &self,
        session: &Session,
        prompt: &str,
    ) -> Result<String, CharlaError> {
        let history = messages::get_recent_messages(
            &self.db,
            &session.id,
            self.config.engine.history_limit,
        )
        .await?;
        let mut chat: Vec<ChatMessage> = history
            .iter()
            .map(|m| ChatMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();
        chat.push(ChatMessage::user(prompt));

        let system = "Answer with only the requested value, no preamble.";
        let started = std::time::Instant::now();
        let reply = self
            .deps
            .provider
            .generate_response(
                system,
                &chat,
                self.config.provider.temperature,
                VARIABLE_MAX_TOKENS,
            )
            .await?;
        self.spawn_usage_log(&session.id, prompt, &reply, started.elapsed().as_millis() as u64);
        Ok(reply.content.trim().to_string())
    }

    /// Bounded retry around the model call and parse. `None` after the
    /// attempt ceiling, with the inter-attempt delay between tries.
    async fn call_with_retry(
        &self,
        session: &Session,
        system_prompt: &str,
        chat: &[ChatMessage],
    ) -> Option<(ParsedReply, TokenUsage)> {
        let attempts = self.config.engine.retry_attempts.max(1);
        for attempt in 1..=attempts {
            let started = std::time::Instant::now();
            let result = self
                .deps
                .provider
                .generate_response(
                    system_prompt,
                    chat,
                    self.config.provider.temperature,
                    self.config.provider.max_tokens,
                )
                .await;
            match result {
                Ok(reply) => {
                    self.spawn_usage_log(
                        &session.id,
                        system_prompt,
                        &reply,
                        started.elapsed().as_millis() as u64,
                    );
                    if let Some(parsed) = parse_model_reply(&reply.content) {
                        return Some((parsed, reply.usage));
                    }
                    warn!(
                        session_id = %session.id,
                        attempt,
                        "model reply yielded no usable text"
                    );
                }
                Err(e) => {
                    warn!(session_id = %session.id, attempt, error = %e, "model call failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.engine.retry_delay_ms,
                ))
                .await;
            }
        }
        error!(session_id = %session.id, attempts, "model retry ceiling exhausted");
        None
    }

    /// Mark escalated, alert a human best-effort, and answer with the
    /// canned handoff message.
    async fn handle_escalation(
        &self,
        session: &mut Session,
        contact: &Contact,
        language: &str,
        reason: &str,
        summary: &str,
    ) -> Result<EngineOutput, CharlaError> {
        let now = now_ts();
        sessions::set_escalated(&self.db, &session.id, reason, &now).await?;
        session.escalated = true;
        session.escalation_reason = Some(reason.to_string());
        info!(session_id = %session.id, reason, "session escalated");

        if let (Some(notifier), Some(destination)) = (
            self.deps.notifier.clone(),
            self.config.escalation.alert_destination.clone(),
        ) {
            let alert = EscalationAlert {
                reason: reason.to_string(),
                user_name: contact.name.clone(),
                user_phone: Some(contact.channel_user_id.clone()),
                summary: truncate_preview(summary, PREVIEW_CHARS),
            };
            // Fire-and-forget: delivery failure must never block the reply.
            tokio::spawn(async move {
                if let Err(e) = notifier.send_escalation_alert(&destination, &alert).await {
                    warn!(error = %e, "escalation alert delivery failed");
                }
            });
        }

        let handoff = canned_handoff(language);
        self.persist_outbound(&session.id, handoff, None, None).await?;

        Ok(EngineOutput {
            session_id: session.id.clone(),
            responses: vec![BotResponse {
                content: handoff.to_string(),
                usage: TokenUsage::default(),
                transition: None,
            }],
            escalated: true,
            transition: None,
        })
    }

    /// Apply the model's transition recommendation when legal and
    /// confident enough; otherwise log and discard.
    fn apply_transition(
        &self,
        machine: &Option<StateMachine>,
        session: &mut Session,
        parsed: &ParsedReply,
    ) -> Option<TransitionRecord> {
        let recommendation = parsed.transition.as_ref()?;
        let threshold = self.config.engine.transition_confidence_threshold;
        if recommendation.confidence < threshold {
            debug!(
                session_id = %session.id,
                to_state = %recommendation.to_state,
                confidence = recommendation.confidence,
                "transition recommendation below confidence threshold, ignored"
            );
            return None;
        }
        let machine = machine.as_ref()?;
        match machine.transition_to(
            &session.current_state,
            &recommendation.to_state,
            &recommendation.reason,
        ) {
            Ok(record) => {
                info!(
                    session_id = %session.id,
                    from = %record.from,
                    to = %record.to,
                    "state transition applied"
                );
                session.previous_state = Some(record.from.clone());
                session.current_state = record.to.clone();
                session.followup_index = -1;
                Some(record)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    to_state = %recommendation.to_state,
                    error = %e,
                    "transition recommendation rejected"
                );
                None
            }
        }
    }

    /// Merge extracted facts additively into the session context map.
    /// New keys win on conflict; absent fields leave existing values alone.
    fn merge_context(&self, session: &mut Session, parsed: &ParsedReply) {
        let Some(extracted) = &parsed.extracted_data else {
            return;
        };
        if extracted.is_empty() {
            return;
        }
        let mut context: serde_json::Map<String, serde_json::Value> = session
            .context
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        for (key, value) in extracted {
            context.insert(key.clone(), value.clone());
        }
        session.context = serde_json::to_string(&context).ok();
    }

    async fn enrich_media(&self, message: &InboundMessage) -> String {
        let Some(media) = &message.media else {
            return message.text.clone();
        };
        let enrichment = match media.kind {
            MediaKind::Audio => match self.deps.media.transcribe(&media.url).await {
                Ok(t) => format!("[Audio transcript: {}]", t.text),
                Err(e) => {
                    warn!(url = %media.url, error = %e, "transcription failed");
                    "[audio message could not be transcribed]".to_string()
                }
            },
            MediaKind::Image => match self.deps.media.analyze_image(&media.url).await {
                Ok(a) => format!("[Image: {}]", a.description),
                Err(e) => {
                    warn!(url = %media.url, error = %e, "image analysis failed");
                    "[image could not be analyzed]".to_string()
                }
            },
        };
        if message.text.is_empty() {
            enrichment
        } else {
            format!("{}\n{}", message.text, enrichment)
        }
    }

    async fn find_or_create_contact(
        &self,
        message: &InboundMessage,
    ) -> Result<Contact, CharlaError> {
        let channel = message.key.channel.to_string();
        if let Some(contact) =
            contacts::find_by_channel_identity(&self.db, &channel, &message.key.user_id).await?
        {
            if contact.name.is_none() {
                if let Some(name) = &message.sender_name {
                    contacts::fill_name_if_missing(&self.db, &contact.id, name, &now_ts()).await?;
                }
            }
            return Ok(contact);
        }
        let now = now_ts();
        let contact = Contact {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            channel_user_id: message.key.user_id.clone(),
            name: message.sender_name.clone(),
            language: None,
            registered: false,
            deposit_confirmed: false,
            lifetime_value: 0.0,
            attribution: None,
            created_at: now.clone(),
            updated_at: now,
        };
        contacts::create_contact(&self.db, &contact).await?;
        info!(contact_id = %contact.id, "contact created");
        Ok(contact)
    }

    async fn find_or_create_session(
        &self,
        message: &InboundMessage,
        contact: &Contact,
    ) -> Result<Session, CharlaError> {
        let group_hash = message.key.group_hash();
        if let Some(session) = sessions::get_by_group_hash(&self.db, &group_hash).await? {
            return Ok(session);
        }
        let flow_name = self.config.engine.default_flow.clone();
        let initial_state = self
            .load_flow_machine(&flow_name)
            .await
            .map(|m| m.initial_state().to_string())
            .unwrap_or_else(|| "greeting".to_string());
        let now = now_ts();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            contact_id: contact.id.clone(),
            channel: message.key.channel.to_string(),
            channel_id: message.key.channel_id.clone(),
            user_id: message.key.user_id.clone(),
            group_hash,
            flow_name,
            current_state: initial_state,
            previous_state: None,
            context: None,
            escalated: false,
            escalation_reason: None,
            status: "active".to_string(),
            followup_index: -1,
            last_message_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        sessions::create_session(&self.db, &session).await?;
        info!(session_id = %session.id, state = %session.current_state, "session created");
        Ok(session)
    }

    async fn load_state_machine(&self, session: &Session) -> Option<StateMachine> {
        self.load_flow_machine(&session.flow_name).await
    }

    async fn load_flow_machine(&self, flow_name: &str) -> Option<StateMachine> {
        match flows::get_active_flow(&self.db, flow_name).await {
            Ok(Some(record)) => match StateMachine::from_json(&record.definition) {
                Ok(machine) => Some(machine),
                Err(e) => {
                    warn!(flow_name, error = %e, "active flow definition is invalid");
                    None
                }
            },
            Ok(None) => {
                warn!(flow_name, "no active flow definition");
                None
            }
            Err(e) => {
                warn!(flow_name, error = %e, "failed to load flow definition");
                None
            }
        }
    }

    /// The current state's config, tolerating missing flows and states.
    pub async fn state_config_for(&self, session: &Session) -> Option<StateConfig> {
        let machine = self.load_state_machine(session).await?;
        machine.config(&session.current_state).ok().cloned()
    }

    fn idle_seconds(&self, session: &Session) -> i64 {
        session
            .last_message_at
            .as_deref()
            .and_then(|s| parse_ts(s).ok())
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(i64::MAX)
    }

    async fn persist_inbound(
        &self,
        session: &Session,
        texts: &[String],
    ) -> Result<(), CharlaError> {
        let base = Utc::now();
        for (i, text) in texts.iter().enumerate() {
            // Distinct timestamps keep arrival order stable under the
            // (created_at, id) history sort.
            let created_at = format_ts(base + Duration::milliseconds(i as i64));
            let msg = StoredMessage {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session.id.clone(),
                role: "user".to_string(),
                content: text.clone(),
                token_count: None,
                metadata: None,
                created_at,
            };
            messages::insert_message(&self.db, &msg).await?;
        }
        Ok(())
    }

    async fn persist_outbound(
        &self,
        session_id: &str,
        content: &str,
        usage: Option<TokenUsage>,
        transition: Option<&TransitionRecord>,
    ) -> Result<(), CharlaError> {
        let metadata = transition
            .map(serde_json::to_value)
            .transpose()
            .ok()
            .flatten()
            .map(|t| serde_json::json!({ "transition": t }).to_string());
        let msg = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: "assistant".to_string(),
            content: content.to_string(),
            token_count: usage.map(|u| i64::from(u.output_tokens)),
            metadata,
            created_at: now_ts(),
        };
        messages::insert_message(&self.db, &msg).await
    }

    fn spawn_usage_log(&self, session_id: &str, input: &str, reply: &ProviderReply, latency_ms: u64) {
        let entry = UsageEntry {
            session_id: session_id.to_string(),
            model: self.config.provider.model.clone(),
            usage: reply.usage,
            cost_usd: f64::from(reply.usage.input_tokens) / 1_000_000.0 * COST_PER_MTOK_INPUT
                + f64::from(reply.usage.output_tokens) / 1_000_000.0 * COST_PER_MTOK_OUTPUT,
            input_preview: truncate_preview(input, PREVIEW_CHARS),
            output_preview: truncate_preview(&reply.content, PREVIEW_CHARS),
            latency_ms,
            finish_reason: reply.finish_reason.clone(),
        };
        let logger = Arc::clone(&self.deps.usage_logger);
        tokio::spawn(async move {
            logger.log(entry).await;
        });
    }
}

/// Root object for follow-up variable path lookups.
fn binding_root(session: &Session, contact: Option<&Contact>) -> serde_json::Value {
    let context: serde_json::Value = session
        .context
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    let contact_value = contact
        .map(|c| {
            serde_json::json!({
                "name": c.name,
                "language": c.language,
                "registered": c.registered,
            })
        })
        .unwrap_or_else(|| serde_json::json!({}));
    serde_json::json!({
        "contact": contact_value,
        "context": context,
        "session": {
            "current_state": session.current_state,
            "flow_name": session.flow_name,
        },
    })
}

fn canned_handoff(language: &str) -> &'static str {
    match language {
        "es" => "Entiendo, te comunico con una persona de nuestro equipo. Te escribirán en breve.",
        "pt" => "Entendi, vou te conectar com alguém da nossa equipe. Eles falam com você em breve.",
        _ => "Understood, I'm connecting you with a member of our team. They'll message you shortly.",
    }
}

fn canned_failure(language: &str) -> &'static str {
    match language {
        "es" => "Disculpa, estamos teniendo dificultades técnicas. Por favor intenta de nuevo en unos minutos.",
        "pt" => "Desculpe, estamos com dificuldades técnicas. Por favor, tente novamente em alguns minutos.",
        _ => "Sorry, we're having technical difficulties. Please try again in a few minutes.",
    }
}
