// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge (RAG) and few-shot example retrieval.

use charla_core::traits::EmbeddingAdapter;
use charla_core::CharlaError;
use charla_storage::models::{ConversationExample, KnowledgeEntry};
use charla_storage::queries::{examples, knowledge};
use charla_storage::Database;
use tracing::debug;

const SIMILARITY_TOP_K: usize = 3;
const PER_CATEGORY_LIMIT: usize = 2;
const MAX_CATEGORIES: usize = 2;
const MERGED_CAP: usize = 5;
const EXAMPLE_LIMIT: usize = 2;

/// Retrieve knowledge grounding for a message: top entries by embedding
/// similarity, plus entries for the current state's category hints,
/// deduplicated by id and capped.
pub async fn retrieve_knowledge(
    db: &Database,
    embedder: &dyn EmbeddingAdapter,
    text: &str,
    rag_categories: &[String],
) -> Result<Vec<KnowledgeEntry>, CharlaError> {
    let query = embedder.embed(text).await?;
    let mut merged = knowledge::search_similar(db, &query, SIMILARITY_TOP_K).await?;

    for category in rag_categories.iter().take(MAX_CATEGORIES) {
        let entries = knowledge::get_by_category(db, category, PER_CATEGORY_LIMIT).await?;
        for entry in entries {
            if !merged.iter().any(|e| e.id == entry.id) {
                merged.push(entry);
            }
        }
    }
    merged.truncate(MERGED_CAP);
    debug!(count = merged.len(), "knowledge retrieved");
    Ok(merged)
}

/// Few-shot examples for a state: prefer happy-path transcripts, fall back
/// to any category, and accept zero rather than injecting irrelevant ones.
pub async fn retrieve_examples(
    db: &Database,
    state: &str,
) -> Result<Vec<ConversationExample>, CharlaError> {
    let happy = examples::get_for_state(db, state, Some("happy_path"), EXAMPLE_LIMIT).await?;
    if !happy.is_empty() {
        return Ok(happy);
    }
    examples::get_for_state(db, state, None, EXAMPLE_LIMIT).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use charla_test_utils::{MockEmbedder, TestDb};

    fn entry(id: &str, category: &str, embedding: &[f32]) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            category: category.to_string(),
            title: format!("title {id}"),
            content: format!("content {id}"),
            embedding: serde_json::to_string(embedding).unwrap(),
        }
    }

    fn example(id: &str, state: &str, category: &str) -> ConversationExample {
        ConversationExample {
            id: id.to_string(),
            scenario: "s".to_string(),
            category: category.to_string(),
            outcome: "o".to_string(),
            primary_state: state.to_string(),
            state_flow: "[]".to_string(),
            messages: "[]".to_string(),
        }
    }

    #[tokio::test]
    async fn merged_set_is_deduped_and_capped() {
        let harness = TestDb::new().await;
        let embedder = MockEmbedder::new();
        let query_vec = embedder.embed("pricing question").await.unwrap();

        // Seed with the query vector itself so similarity hits are known,
        // overlapping one id between similarity and category results.
        for i in 0..4 {
            knowledge::upsert_entry(&harness.db, &entry(&format!("p{i}"), "pricing", &query_vec))
                .await
                .unwrap();
        }
        for i in 0..3 {
            knowledge::upsert_entry(&harness.db, &entry(&format!("s{i}"), "shipping", &query_vec))
                .await
                .unwrap();
        }

        let results = retrieve_knowledge(
            &harness.db,
            &embedder,
            "pricing question",
            &["pricing".to_string(), "shipping".to_string(), "ignored".to_string()],
        )
        .await
        .unwrap();

        assert!(results.len() <= 5);
        let mut ids: Vec<&str> = results.iter().map(|e| e.id.as_str()).collect();
        let before = ids.len();
        ids.dedup();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before, "duplicate ids in merged set");
    }

    #[tokio::test]
    async fn examples_prefer_happy_path_then_fall_back() {
        let harness = TestDb::new().await;
        examples::upsert_example(&harness.db, &example("e1", "qualifying", "happy_path"))
            .await
            .unwrap();
        examples::upsert_example(&harness.db, &example("e2", "qualifying", "deviation"))
            .await
            .unwrap();
        examples::upsert_example(&harness.db, &example("e3", "closing", "edge_case"))
            .await
            .unwrap();

        let picked = retrieve_examples(&harness.db, "qualifying").await.unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "e1");

        let fallback = retrieve_examples(&harness.db, "closing").await.unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].id, "e3");

        assert!(retrieve_examples(&harness.db, "farewell").await.unwrap().is_empty());
    }
}
