// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Charla conversation backend.
//!
//! All state shared between workers lives here: sessions, contacts,
//! messages, the debounced pending-message buffer, knowledge entries,
//! few-shot examples, flow definitions, and the follow-up queue.

pub mod buffer;
pub mod database;
pub mod models;
pub mod queries;

pub use buffer::{CleanupCounts, MessageBuffer};
pub use database::Database;
pub use models::{
    Contact, ConversationExample, FlowRecord, FollowupQueueItem, KnowledgeEntry, PendingMessage,
    Session, StoredMessage,
};
