// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-database harness and row fixtures shared by integration tests.

use charla_core::time::now_ts;
use charla_storage::models::{Contact, Session};
use charla_storage::queries::{contacts, sessions};
use charla_storage::Database;
use tempfile::TempDir;

/// A fresh on-disk database in a temp directory, dropped with the harness.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("charla-test.db");
        let db = Database::open(path.to_str().expect("utf-8 temp path"))
            .await
            .expect("open test database");
        Self { db, _dir: dir }
    }

    /// Insert a minimal contact and return it.
    pub async fn seed_contact(&self, id: &str) -> Contact {
        let contact = contact_fixture(id);
        contacts::create_contact(&self.db, &contact)
            .await
            .expect("seed contact");
        contact
    }

    /// Insert a session owned by `contact_id` and return it.
    pub async fn seed_session(&self, id: &str, contact_id: &str, group_hash: &str) -> Session {
        let session = session_fixture(id, contact_id, group_hash);
        sessions::create_session(&self.db, &session)
            .await
            .expect("seed session");
        session
    }
}

pub fn contact_fixture(id: &str) -> Contact {
    let now = now_ts();
    Contact {
        id: id.to_string(),
        channel: "whatsapp".to_string(),
        channel_user_id: format!("+55119{id}"),
        name: Some("Ana".to_string()),
        language: Some("es".to_string()),
        registered: false,
        deposit_confirmed: false,
        lifetime_value: 0.0,
        attribution: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

pub fn session_fixture(id: &str, contact_id: &str, group_hash: &str) -> Session {
    let now = now_ts();
    Session {
        id: id.to_string(),
        contact_id: contact_id.to_string(),
        channel: "whatsapp".to_string(),
        channel_id: "biz-1".to_string(),
        user_id: format!("user-{id}"),
        group_hash: group_hash.to_string(),
        flow_name: "sales".to_string(),
        current_state: "greeting".to_string(),
        previous_state: None,
        context: None,
        escalated: false,
        escalation_reason: None,
        status: "active".to_string(),
        followup_index: -1,
        last_message_at: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_seeds_linked_rows() {
        let harness = TestDb::new().await;
        let contact = harness.seed_contact("c1").await;
        let session = harness.seed_session("s1", &contact.id, "hash-1").await;

        let stored = sessions::get_by_group_hash(&harness.db, "hash-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, session.id);
        assert_eq!(stored.contact_id, "c1");
    }
}
