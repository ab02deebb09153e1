// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row models for the Charla persistence layer.
//!
//! Timestamps are millisecond-precision UTC strings (see `charla_core::time`).
//! JSON columns (`context`, `payload`, `embedding`, ...) are stored as text
//! and deserialized by the callers that own their shape.

use rusqlite::Row;

/// The human behind one or more sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    pub channel: String,
    pub channel_user_id: String,
    pub name: Option<String>,
    pub language: Option<String>,
    pub registered: bool,
    pub deposit_confirmed: bool,
    pub lifetime_value: f64,
    /// JSON attribution fields (campaign, source, ...).
    pub attribution: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Contact {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            channel: row.get(1)?,
            channel_user_id: row.get(2)?,
            name: row.get(3)?,
            language: row.get(4)?,
            registered: row.get::<_, i64>(5)? != 0,
            deposit_confirmed: row.get::<_, i64>(6)? != 0,
            lifetime_value: row.get(7)?,
            attribution: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, channel, channel_user_id, name, language, registered, deposit_confirmed, \
         lifetime_value, attribution, created_at, updated_at";
}

/// One conversation thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub contact_id: String,
    pub channel: String,
    pub channel_id: String,
    pub user_id: String,
    pub group_hash: String,
    pub flow_name: String,
    pub current_state: String,
    pub previous_state: Option<String>,
    /// JSON map of accumulated extracted facts.
    pub context: Option<String>,
    pub escalated: bool,
    pub escalation_reason: Option<String>,
    pub status: String,
    /// Index into the current state's follow-up sequence; -1 means none fired.
    pub followup_index: i64,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            contact_id: row.get(1)?,
            channel: row.get(2)?,
            channel_id: row.get(3)?,
            user_id: row.get(4)?,
            group_hash: row.get(5)?,
            flow_name: row.get(6)?,
            current_state: row.get(7)?,
            previous_state: row.get(8)?,
            context: row.get(9)?,
            escalated: row.get::<_, i64>(10)? != 0,
            escalation_reason: row.get(11)?,
            status: row.get(12)?,
            followup_index: row.get(13)?,
            last_message_at: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, contact_id, channel, channel_id, user_id, group_hash, flow_name, current_state, \
         previous_state, context, escalated, escalation_reason, status, followup_index, \
         last_message_at, created_at, updated_at";
}

/// One persisted conversation turn (inbound or outbound).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub token_count: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: String,
}

impl StoredMessage {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            token_count: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, session_id, role, content, token_count, metadata, created_at";
}

/// One buffered inbound message awaiting debounced processing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub id: i64,
    pub group_hash: String,
    /// JSON-serialized `charla_core::InboundMessage`.
    pub payload: String,
    pub received_at: String,
    pub scheduled_process_at: String,
    pub retry_count: i64,
    pub last_error: Option<String>,
    /// Claim lock marker; NULL when the row is free.
    pub processing_started_at: Option<String>,
}

impl PendingMessage {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_hash: row.get(1)?,
            payload: row.get(2)?,
            received_at: row.get(3)?,
            scheduled_process_at: row.get(4)?,
            retry_count: row.get(5)?,
            last_error: row.get(6)?,
            processing_started_at: row.get(7)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, group_hash, payload, received_at, scheduled_process_at, retry_count, \
         last_error, processing_started_at";
}

/// One knowledge-base entry with its embedding vector (JSON array of f32).
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub category: String,
    pub title: String,
    pub content: String,
    pub embedding: String,
}

impl KnowledgeEntry {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            embedding: row.get(4)?,
        })
    }

    pub(crate) const COLUMNS: &'static str = "id, category, title, content, embedding";
}

/// A labeled few-shot transcript used read-only for prompt conditioning.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationExample {
    pub id: String,
    pub scenario: String,
    /// happy_path | deviation | edge_case | complex
    pub category: String,
    pub outcome: String,
    pub primary_state: String,
    /// JSON array of state names.
    pub state_flow: String,
    /// JSON array of role-tagged messages.
    pub messages: String,
}

impl ConversationExample {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scenario: row.get(1)?,
            category: row.get(2)?,
            outcome: row.get(3)?,
            primary_state: row.get(4)?,
            state_flow: row.get(5)?,
            messages: row.get(6)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, scenario, category, outcome, primary_state, state_flow, messages";
}

/// A versioned state-machine definition (JSON) loaded by name.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub name: String,
    pub version: i64,
    pub active: bool,
    pub definition: String,
}

impl FlowRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            version: row.get(1)?,
            active: row.get::<_, i64>(2)? != 0,
            definition: row.get(3)?,
        })
    }

    pub(crate) const COLUMNS: &'static str = "name, version, active, definition";
}

/// One scheduled proactive message.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowupQueueItem {
    pub id: i64,
    pub session_id: String,
    pub config_name: String,
    pub scheduled_at: String,
    /// pending | sent | cancelled | failed
    pub status: String,
    pub last_error: Option<String>,
    pub retry_count: i64,
    pub processing_started_at: Option<String>,
    pub created_at: String,
}

impl FollowupQueueItem {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            config_name: row.get(2)?,
            scheduled_at: row.get(3)?,
            status: row.get(4)?,
            last_error: row.get(5)?,
            retry_count: row.get(6)?,
            processing_started_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub(crate) const COLUMNS: &'static str =
        "id, session_id, config_name, scheduled_at, status, last_error, retry_count, \
         processing_started_at, created_at";
}
