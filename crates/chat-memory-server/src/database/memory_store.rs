use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    ChatMessage, ChatSession, MemoryHit, MessageHit, NewChatMessage, NewMemoryEntry,
    SemanticMemoryEntry,
};
use crate::models::chat::SessionId;
use crate::services::conversation::providers::ChatStore;
use crate::utils::similarity::cosine_similarity;

/// Process-local store with the same contract as the Postgres one.
///
/// Messages and memories keep their insertion sequence, which breaks ties
/// when two rows share a timestamp.
#[derive(Clone, Default)]
pub struct InMemoryChatStore {
    sessions: Arc<DashMap<SessionId, ChatSession>>,
    messages: Arc<DashMap<SessionId, Vec<(u64, ChatMessage)>>>,
    memories: Arc<Mutex<Vec<(u64, SemanticMemoryEntry)>>>,
    seq: Arc<AtomicU64>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::SeqCst)
    }

    pub fn message_count(&self) -> usize {
        self.messages.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn memory_count(&self) -> usize {
        self.memories.lock().len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Similarity descending, then newest first (timestamp, then insertion order).
fn rank<T>(hits: &mut [(u64, T)], similarity: impl Fn(&T) -> f32, created: impl Fn(&T) -> i64) {
    hits.sort_by(|(seq_a, a), (seq_b, b)| {
        similarity(b)
            .partial_cmp(&similarity(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| created(b).cmp(&created(a)))
            .then_with(|| seq_b.cmp(seq_a))
    });
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            auto_titled: true,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.sessions.insert(session.id, session.clone());
        debug!("Created session {} for user {}", session.id, user_id);
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<ChatSession>> {
        Ok(self.sessions.get(&session_id).map(|s| s.value().clone()))
    }

    async fn update_session_title(
        &self,
        session_id: SessionId,
        title: &str,
        auto_titled: bool,
    ) -> Result<ChatSession> {
        let mut entry = self
            .sessions
            .get_mut(&session_id)
            .with_context(|| format!("Session {} does not exist", session_id))?;

        let session = entry.value_mut();
        session.title = title.to_string();
        session.auto_titled = auto_titled;
        session.updated_at = session.updated_at.max(Utc::now());
        Ok(session.clone())
    }

    async fn retitle_if_auto(&self, session_id: SessionId, title: &str) -> Result<Option<ChatSession>> {
        let Some(mut entry) = self.sessions.get_mut(&session_id) else {
            return Ok(None);
        };

        // Checked under the shard lock so a concurrent rename cannot slip in
        let session = entry.value_mut();
        if !session.auto_titled {
            return Ok(None);
        }
        session.title = title.to_string();
        session.updated_at = session.updated_at.max(Utc::now());
        Ok(Some(session.clone()))
    }

    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_owned_by(user_id))
            .map(|entry| entry.value().clone())
            .collect();

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool> {
        let removed = self.sessions.remove(&session_id).is_some();
        self.messages.remove(&session_id);
        Ok(removed)
    }

    async fn insert_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        if !self.sessions.contains_key(&message.session_id) {
            anyhow::bail!("Session {} does not exist", message.session_id);
        }

        let stored = ChatMessage {
            id: Uuid::new_v4(),
            session_id: message.session_id,
            user_id: message.user_id,
            role: message.role,
            content: message.content,
            embedding: message.embedding,
            tokens_used: message.tokens_used,
            model: message.model,
            created_at: Utc::now(),
        };

        let seq = self.next_seq();
        self.messages
            .entry(stored.session_id)
            .or_default()
            .push((seq, stored.clone()));

        Ok(stored)
    }

    async fn recent_messages(&self, session_id: SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        let Some(entry) = self.messages.get(&session_id) else {
            return Ok(Vec::new());
        };

        let all = entry.value();
        let start = all.len().saturating_sub(limit);
        let recent = all[start..].iter().map(|(_, m)| m.clone()).collect();
        Ok(recent)
    }

    async fn search_messages(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MessageHit>> {
        let mut hits: Vec<(u64, MessageHit)> = Vec::new();

        for entry in self.messages.iter() {
            for (seq, message) in entry.value() {
                if message.user_id != user_id {
                    continue;
                }
                let Some(embedding) = message.embedding.as_deref() else {
                    continue;
                };
                let similarity = cosine_similarity(query, embedding)?;
                if similarity >= threshold {
                    hits.push((
                        *seq,
                        MessageHit {
                            message_id: message.id,
                            session_id: message.session_id,
                            role: message.role,
                            content: message.content.clone(),
                            similarity,
                            created_at: message.created_at,
                        },
                    ));
                }
            }
        }

        rank(&mut hits, |h| h.similarity, |h| h.created_at.timestamp_micros());
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn insert_memory(&self, entry: NewMemoryEntry) -> Result<SemanticMemoryEntry> {
        let stored = SemanticMemoryEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            content: entry.content,
            summary: entry.summary,
            embedding: entry.embedding,
            importance: entry.importance.clamp(0.0, 1.0),
            tags: entry.tags,
            created_at: Utc::now(),
        };

        let seq = self.next_seq();
        self.memories.lock().push((seq, stored.clone()));
        Ok(stored)
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let mut hits: Vec<(u64, MemoryHit)> = Vec::new();

        for (seq, memory) in self.memories.lock().iter() {
            if memory.user_id != user_id {
                continue;
            }
            let similarity = cosine_similarity(query, &memory.embedding)?;
            if similarity >= threshold {
                hits.push((
                    *seq,
                    MemoryHit {
                        memory_id: memory.id,
                        content: memory.content.clone(),
                        summary: memory.summary.clone(),
                        importance: memory.importance,
                        tags: memory.tags.clone(),
                        similarity,
                        created_at: memory.created_at,
                    },
                ));
            }
        }

        rank(&mut hits, |h| h.similarity, |h| h.created_at.timestamp_micros());
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn list_memories(&self, user_id: &str, limit: usize) -> Result<Vec<SemanticMemoryEntry>> {
        let memories = self.memories.lock();
        let newest = memories
            .iter()
            .rev()
            .filter(|(_, m)| m.user_id == user_id)
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect();
        Ok(newest)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn new_message(session: &ChatSession, role: Role, content: &str, embedding: Option<Vec<f32>>) -> NewChatMessage {
        NewChatMessage {
            session_id: session.id,
            user_id: session.user_id.clone(),
            role,
            content: content.to_string(),
            embedding,
            tokens_used: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn test_recent_messages_round_trip_in_chronological_order() {
        let store = InMemoryChatStore::new();
        let session = store.create_session("alice", "t").await.unwrap();

        for i in 0..12 {
            store
                .insert_message(new_message(&session, Role::User, &format!("m{}", i), Some(vec![1.0, 0.0])))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(session.id, 10).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4", "m5", "m6", "m7", "m8", "m9", "m10", "m11"]);
    }

    #[tokio::test]
    async fn test_insert_into_unknown_session_fails() {
        let store = InMemoryChatStore::new();
        let ghost = ChatSession {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            title: String::new(),
            auto_titled: true,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(store.insert_message(new_message(&ghost, Role::User, "x", None)).await.is_err());
    }

    #[tokio::test]
    async fn test_message_search_skips_missing_embeddings_and_other_users() {
        let store = InMemoryChatStore::new();
        let alice = store.create_session("alice", "a").await.unwrap();
        let bob = store.create_session("bob", "b").await.unwrap();

        store.insert_message(new_message(&alice, Role::User, "with", Some(vec![1.0, 0.0]))).await.unwrap();
        store.insert_message(new_message(&alice, Role::Assistant, "without", None)).await.unwrap();
        store.insert_message(new_message(&bob, Role::User, "bob's", Some(vec![1.0, 0.0]))).await.unwrap();

        let hits = store.search_messages("alice", &[1.0, 0.0], 0.0, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "with");
    }

    #[tokio::test]
    async fn test_ties_rank_newest_first() {
        let store = InMemoryChatStore::new();
        let session = store.create_session("alice", "a").await.unwrap();
        store.insert_message(new_message(&session, Role::User, "older", Some(vec![1.0, 0.0]))).await.unwrap();
        store.insert_message(new_message(&session, Role::User, "newer", Some(vec![2.0, 0.0]))).await.unwrap();

        let hits = store.search_messages("alice", &[1.0, 0.0], 0.5, 10).await.unwrap();
        assert_eq!(hits[0].content, "newer");
        assert_eq!(hits[1].content, "older");
    }

    #[tokio::test]
    async fn test_delete_session_cascades_to_messages() {
        let store = InMemoryChatStore::new();
        let session = store.create_session("alice", "a").await.unwrap();
        store.insert_message(new_message(&session, Role::User, "x", Some(vec![1.0]))).await.unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert_eq!(store.message_count(), 0);
        assert!(store.get_session(session.id).await.unwrap().is_none());
        assert!(!store.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_updated_at_never_decreases() {
        let store = InMemoryChatStore::new();
        let session = store.create_session("alice", "a").await.unwrap();
        let renamed = store.update_session_title(session.id, "b", false).await.unwrap();
        assert!(renamed.updated_at >= session.updated_at);
        assert!(!renamed.auto_titled);
    }

    #[tokio::test]
    async fn test_retitle_if_auto_skips_renamed_sessions() {
        let store = InMemoryChatStore::new();
        let session = store.create_session("alice", "first").await.unwrap();

        let retitled = store.retitle_if_auto(session.id, "second").await.unwrap().unwrap();
        assert_eq!(retitled.title, "second");
        assert!(retitled.auto_titled);

        store.update_session_title(session.id, "Mine", false).await.unwrap();
        assert!(store.retitle_if_auto(session.id, "third").await.unwrap().is_none());
        assert_eq!(store.get_session(session.id).await.unwrap().unwrap().title, "Mine");

        assert!(store.retitle_if_auto(uuid::Uuid::new_v4(), "x").await.unwrap().is_none());
    }
}
