// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD operations.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Contact;

/// Create a new contact.
pub async fn create_contact(db: &Database, contact: &Contact) -> Result<(), CharlaError> {
    let contact = contact.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts
                     (id, channel, channel_user_id, name, language, registered,
                      deposit_confirmed, lifetime_value, attribution, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    contact.id,
                    contact.channel,
                    contact.channel_user_id,
                    contact.name,
                    contact.language,
                    contact.registered as i64,
                    contact.deposit_confirmed as i64,
                    contact.lifetime_value,
                    contact.attribution,
                    contact.created_at,
                    contact.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Find a contact by channel identity.
pub async fn find_by_channel_identity(
    db: &Database,
    channel: &str,
    channel_user_id: &str,
) -> Result<Option<Contact>, CharlaError> {
    let channel = channel.to_string();
    let channel_user_id = channel_user_id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM contacts WHERE channel = ?1 AND channel_user_id = ?2",
                Contact::COLUMNS
            );
            let result = conn.query_row(&sql, params![channel, channel_user_id], Contact::from_row);
            match result {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Get a contact by id.
pub async fn get_contact(db: &Database, id: &str) -> Result<Option<Contact>, CharlaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {} FROM contacts WHERE id = ?1", Contact::COLUMNS);
            let result = conn.query_row(&sql, params![id], Contact::from_row);
            match result {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Update a contact's display name if currently unset.
pub async fn fill_name_if_missing(
    db: &Database,
    id: &str,
    name: &str,
    now: &str,
) -> Result<(), CharlaError> {
    let id = id.to_string();
    let name = name.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET name = ?1, updated_at = ?2
                 WHERE id = ?3 AND (name IS NULL OR name = '')",
                params![name, now, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Inserts a minimal contact row for tests that need the FK satisfied.
    pub(crate) async fn seed_contact(db: &Database, id: &str) {
        let contact = Contact {
            id: id.to_string(),
            channel: "whatsapp".to_string(),
            channel_user_id: format!("+55119{id}"),
            name: None,
            language: None,
            registered: false,
            deposit_confirmed: false,
            lifetime_value: 0.0,
            attribution: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        };
        create_contact(db, &contact).await.unwrap();
    }

    #[tokio::test]
    async fn create_and_find_by_identity() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        seed_contact(&db, "c1").await;

        let found = find_by_channel_identity(&db, "whatsapp", "+55119c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "c1");
        assert!(!found.registered);

        assert!(find_by_channel_identity(&db, "telegram", "+55119c1")
            .await
            .unwrap()
            .is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fill_name_only_when_missing() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        seed_contact(&db, "c1").await;

        fill_name_if_missing(&db, "c1", "Ana", "2026-01-02T00:00:00.000Z")
            .await
            .unwrap();
        let contact = get_contact(&db, "c1").await.unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ana"));

        // A second write must not overwrite the established name.
        fill_name_if_missing(&db, "c1", "Other", "2026-01-03T00:00:00.000Z")
            .await
            .unwrap();
        let contact = get_contact(&db, "c1").await.unwrap().unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ana"));

        db.close().await.unwrap();
    }
}
