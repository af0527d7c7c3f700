use anyhow::Result;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::providers::ChatStore;
use crate::database::models::{MemoryHit, MessageHit, RankedHit};
use crate::utils::limiters::Limiters;

pub const MESSAGE_SIMILARITY_THRESHOLD: f32 = 0.6;
pub const MESSAGE_SEARCH_LIMIT: usize = 5;
pub const MEMORY_SIMILARITY_THRESHOLD: f32 = 0.6;
pub const MEMORY_SEARCH_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corpus {
    Messages,
    Memory,
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corpus::Messages => f.write_str("messages"),
            Corpus::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub threshold: f32,
    pub limit: usize,
}

impl SearchParams {
    pub fn messages_default() -> Self {
        Self {
            threshold: MESSAGE_SIMILARITY_THRESHOLD,
            limit: MESSAGE_SEARCH_LIMIT,
        }
    }

    pub fn memory_default() -> Self {
        Self {
            threshold: MEMORY_SIMILARITY_THRESHOLD,
            limit: MEMORY_SEARCH_LIMIT,
        }
    }
}

/// Nearest-neighbour lookups over a user's own message history and memory
/// store. The two corpora are queried independently and never merged here.
#[derive(Clone)]
pub struct SimilaritySearchService {
    store: Arc<dyn ChatStore>,
    limiters: Limiters,
}

impl SimilaritySearchService {
    pub fn new(store: Arc<dyn ChatStore>, limiters: Limiters) -> Self {
        Self { store, limiters }
    }

    pub async fn search_messages(
        &self,
        user_id: &str,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<MessageHit>> {
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let _permit = self.limiters.store_search_permit().await?;
        let hits = self
            .store
            .search_messages(user_id, query, params.threshold, params.limit)
            .await?;

        Ok(self.finish(Corpus::Messages, hits, params))
    }

    pub async fn search_memories(
        &self,
        user_id: &str,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<MemoryHit>> {
        if params.limit == 0 {
            return Ok(Vec::new());
        }

        let _permit = self.limiters.store_search_permit().await?;
        let hits = self
            .store
            .search_memories(user_id, query, params.threshold, params.limit)
            .await?;

        Ok(self.finish(Corpus::Memory, hits, params))
    }

    fn finish<T: RankedHit>(&self, corpus: Corpus, hits: Vec<T>, params: SearchParams) -> Vec<T> {
        let returned = hits.len();
        let ranked = enforce_contract(hits, params);
        debug!(
            %corpus,
            returned,
            kept = ranked.len(),
            threshold = params.threshold,
            limit = params.limit,
            "similarity search finished"
        );
        ranked
    }
}

/// Re-applies threshold, ordering and limit on whatever the store returned.
fn enforce_contract<T: RankedHit>(mut hits: Vec<T>, params: SearchParams) -> Vec<T> {
    hits.retain(|h| h.similarity() >= params.threshold);
    // Stable: equal (similarity, timestamp) pairs keep the store's order
    hits.sort_by(|a, b| {
        b.similarity()
            .partial_cmp(&a.similarity())
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at().cmp(&a.created_at()))
    });
    hits.truncate(params.limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewChatMessage, NewMemoryEntry};
    use crate::database::InMemoryChatStore;
    use crate::models::chat::Role;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn hit(similarity: f32, age_secs: i64, content: &str) -> MessageHit {
        MessageHit {
            message_id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            role: Role::User,
            content: content.into(),
            similarity,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_enforce_drops_below_threshold_and_caps() {
        let hits = vec![
            hit(0.59, 0, "below"),
            hit(0.6, 0, "boundary"),
            hit(0.9, 0, "best"),
            hit(0.7, 0, "mid"),
        ];
        let kept = enforce_contract(hits, SearchParams { threshold: 0.6, limit: 2 });
        let contents: Vec<&str> = kept.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["best", "mid"]);
    }

    #[test]
    fn test_enforce_breaks_ties_by_recency() {
        let hits = vec![hit(0.8, 100, "old"), hit(0.8, 1, "new")];
        let kept = enforce_contract(hits, SearchParams { threshold: 0.0, limit: 5 });
        assert_eq!(kept[0].content, "new");
        assert_eq!(kept[1].content, "old");
    }

    async fn seeded_store() -> Arc<InMemoryChatStore> {
        let store = Arc::new(InMemoryChatStore::new());
        let alice = store.create_session("alice", "a").await.unwrap();
        let bob = store.create_session("bob", "b").await.unwrap();

        let vectors = [vec![1.0, 0.0], vec![0.8, 0.6], vec![0.0, 1.0], vec![0.9, 0.1], vec![0.7, 0.7]];
        for (i, v) in vectors.iter().enumerate() {
            store
                .insert_message(NewChatMessage {
                    session_id: alice.id,
                    user_id: "alice".into(),
                    role: Role::User,
                    content: format!("alice-{}", i),
                    embedding: Some(v.clone()),
                    tokens_used: None,
                    model: None,
                })
                .await
                .unwrap();
        }
        store
            .insert_message(NewChatMessage {
                session_id: bob.id,
                user_id: "bob".into(),
                role: Role::User,
                content: "bob-secret".into(),
                embedding: Some(vec![1.0, 0.0]),
                tokens_used: None,
                model: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_message_search_respects_threshold_limit_and_owner() {
        let store = seeded_store().await;
        let service = SimilaritySearchService::new(store, Limiters::default());

        let hits = service
            .search_messages("alice", &[1.0, 0.0], SearchParams { threshold: 0.6, limit: 3 })
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.similarity >= 0.6));
        assert!(hits.iter().all(|h| h.content.starts_with("alice")));
        assert_eq!(hits[0].content, "alice-0");
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = seeded_store().await;
        let service = SimilaritySearchService::new(store, Limiters::default());

        let hits = service
            .search_messages("carol", &[1.0, 0.0], SearchParams::messages_default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_memory_search_scoped_to_user() {
        let store = Arc::new(InMemoryChatStore::new());
        for (user, v) in [("alice", vec![1.0, 0.0]), ("bob", vec![1.0, 0.0]), ("alice", vec![0.0, 1.0])] {
            store
                .insert_memory(NewMemoryEntry {
                    user_id: user.into(),
                    content: format!("{} memory", user),
                    summary: None,
                    embedding: v,
                    importance: 0.7,
                    tags: vec![],
                })
                .await
                .unwrap();
        }
        let service = SimilaritySearchService::new(store, Limiters::default());

        let hits = service
            .search_memories("alice", &[1.0, 0.0], SearchParams::memory_default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alice memory");
    }

    #[tokio::test]
    async fn test_zero_limit_short_circuits() {
        let store = seeded_store().await;
        let service = SimilaritySearchService::new(store, Limiters::default());
        let hits = service
            .search_messages("alice", &[1.0, 0.0], SearchParams { threshold: 0.0, limit: 0 })
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
