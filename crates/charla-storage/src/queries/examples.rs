// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Few-shot conversation example queries.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::ConversationExample;

/// Insert or replace an example transcript.
pub async fn upsert_example(db: &Database, example: &ConversationExample) -> Result<(), CharlaError> {
    let example = example.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO examples
                     (id, scenario, category, outcome, primary_state, state_flow, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    example.id,
                    example.scenario,
                    example.category,
                    example.outcome,
                    example.primary_state,
                    example.state_flow,
                    example.messages,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Examples for a state, optionally filtered by category.
pub async fn get_for_state(
    db: &Database,
    primary_state: &str,
    category: Option<&str>,
    limit: usize,
) -> Result<Vec<ConversationExample>, CharlaError> {
    let primary_state = primary_state.to_string();
    let category = category.map(|c| c.to_string());
    db.connection()
        .call(move |conn| {
            let mut examples = Vec::new();
            match &category {
                Some(cat) => {
                    let sql = format!(
                        "SELECT {} FROM examples
                         WHERE primary_state = ?1 AND category = ?2 LIMIT ?3",
                        ConversationExample::COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(
                        params![primary_state, cat, limit as i64],
                        ConversationExample::from_row,
                    )?;
                    for row in rows {
                        examples.push(row?);
                    }
                }
                None => {
                    let sql = format!(
                        "SELECT {} FROM examples WHERE primary_state = ?1 LIMIT ?2",
                        ConversationExample::COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(
                        params![primary_state, limit as i64],
                        ConversationExample::from_row,
                    )?;
                    for row in rows {
                        examples.push(row?);
                    }
                }
            }
            Ok(examples)
        })
        .await
        .map_err(map_tr_err)
}
