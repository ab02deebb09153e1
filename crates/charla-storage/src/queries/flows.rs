// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State-machine flow definitions and follow-up message configs.
//!
//! Flow definitions are configuration data, not code: swapping the active
//! version changes conversational behavior without touching the engine.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::FlowRecord;

/// Insert or replace a flow version.
pub async fn upsert_flow(db: &Database, flow: &FlowRecord) -> Result<(), CharlaError> {
    let flow = flow.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO flows (name, version, active, definition)
                 VALUES (?1, ?2, ?3, ?4)",
                params![flow.name, flow.version, flow.active as i64, flow.definition],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark one version of a flow active, deactivating its siblings.
pub async fn activate_flow(db: &Database, name: &str, version: i64) -> Result<(), CharlaError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE flows SET active = 0 WHERE name = ?1",
                params![name],
            )?;
            tx.execute(
                "UPDATE flows SET active = 1 WHERE name = ?1 AND version = ?2",
                params![name, version],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The active version of a named flow.
pub async fn get_active_flow(db: &Database, name: &str) -> Result<Option<FlowRecord>, CharlaError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM flows WHERE name = ?1 AND active = 1
                 ORDER BY version DESC LIMIT 1",
                FlowRecord::COLUMNS
            );
            let result = conn.query_row(&sql, params![name], FlowRecord::from_row);
            match result {
                Ok(flow) => Ok(Some(flow)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a named follow-up message config (JSON definition).
pub async fn upsert_followup_config(
    db: &Database,
    name: &str,
    definition: &str,
) -> Result<(), CharlaError> {
    let name = name.to_string();
    let definition = definition.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO followup_configs (name, definition) VALUES (?1, ?2)",
                params![name, definition],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a follow-up message config definition by name.
pub async fn get_followup_config(db: &Database, name: &str) -> Result<Option<String>, CharlaError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT definition FROM followup_configs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            );
            match result {
                Ok(definition) => Ok(Some(definition)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}
