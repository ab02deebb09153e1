// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge-base queries: similarity search and category lookup.
//!
//! Embeddings are stored as JSON float arrays and scored with cosine
//! similarity in the query layer; the corpus is small enough that a vector
//! index would be overhead.

use charla_core::CharlaError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::KnowledgeEntry;

/// Insert or replace a knowledge entry.
pub async fn upsert_entry(db: &Database, entry: &KnowledgeEntry) -> Result<(), CharlaError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO knowledge (id, category, title, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![entry.id, entry.category, entry.title, entry.content, entry.embedding],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Top-`limit` entries by cosine similarity to the query embedding.
///
/// Rows whose stored vector fails to parse or has mismatched dimensionality
/// are skipped rather than failing the whole search.
pub async fn search_similar(
    db: &Database,
    query_embedding: &[f32],
    limit: usize,
) -> Result<Vec<KnowledgeEntry>, CharlaError> {
    let query = query_embedding.to_vec();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {} FROM knowledge", KnowledgeEntry::COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], KnowledgeEntry::from_row)?;

            let mut scored: Vec<(f32, KnowledgeEntry)> = Vec::new();
            for row in rows {
                let entry = row?;
                let Ok(vector) = serde_json::from_str::<Vec<f32>>(&entry.embedding) else {
                    continue;
                };
                if let Some(score) = cosine_similarity(&query, &vector) {
                    scored.push((score, entry));
                }
            }
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Up to `limit` entries for a category.
pub async fn get_by_category(
    db: &Database,
    category: &str,
    limit: usize,
) -> Result<Vec<KnowledgeEntry>, CharlaError> {
    let category = category.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {} FROM knowledge WHERE category = ?1 LIMIT ?2",
                KnowledgeEntry::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![category, limit as i64], KnowledgeEntry::from_row)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Cosine similarity of equal-length non-zero vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    fn entry(id: &str, category: &str, embedding: &[f32]) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            category: category.to_string(),
            title: format!("title {id}"),
            content: format!("content {id}"),
            embedding: serde_json::to_string(embedding).unwrap(),
        }
    }

    #[test]
    fn cosine_basics() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() > 0.99);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let (db, _dir) = setup_db().await;
        upsert_entry(&db, &entry("close", "pricing", &[1.0, 0.0, 0.0])).await.unwrap();
        upsert_entry(&db, &entry("mid", "pricing", &[0.7, 0.7, 0.0])).await.unwrap();
        upsert_entry(&db, &entry("far", "shipping", &[0.0, 0.0, 1.0])).await.unwrap();

        let results = search_similar(&db, &[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "close");
        assert_eq!(results[1].id, "mid");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn search_skips_malformed_vectors() {
        let (db, _dir) = setup_db().await;
        let mut bad = entry("bad", "pricing", &[1.0, 0.0]);
        bad.embedding = "not json".to_string();
        upsert_entry(&db, &bad).await.unwrap();
        upsert_entry(&db, &entry("good", "pricing", &[1.0, 0.0])).await.unwrap();

        let results = search_similar(&db, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "good");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn category_lookup_respects_limit() {
        let (db, _dir) = setup_db().await;
        for i in 0..4 {
            upsert_entry(&db, &entry(&format!("p{i}"), "pricing", &[1.0, 0.0]))
                .await
                .unwrap();
        }

        let results = get_by_category(&db, "pricing", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(get_by_category(&db, "unknown", 2).await.unwrap().is_empty());

        db.close().await.unwrap();
    }
}
