//! Seams to the external collaborators: embedding service, completion
//! service and the durable store. Everything behind these traits is injected
//! at construction so tests can substitute doubles.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::database::models::{
    ChatMessage, ChatSession, MemoryHit, MessageHit, NewChatMessage, NewMemoryEntry,
    SemanticMemoryEntry,
};
use crate::models::chat::{PromptTurn, SessionId};

/// Text → fixed-dimension vector. Exactly one external call per invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub model: Option<String>,
}

/// Ordered prompt turns → generated text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, turns: &[PromptTurn], params: GenerationParams) -> Result<Completion>;
}

/// The durable store. Every user-scoped read must only ever return rows
/// owned by that user.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession>;

    async fn get_session(&self, session_id: SessionId) -> Result<Option<ChatSession>>;

    /// Sets the title and auto-titled flag; `updated_at` never moves backwards.
    async fn update_session_title(
        &self,
        session_id: SessionId,
        title: &str,
        auto_titled: bool,
    ) -> Result<ChatSession>;

    /// Replaces the title only while the session is still auto-titled, as one
    /// atomic step. `None` when the session was renamed by hand or is gone.
    async fn retitle_if_auto(&self, session_id: SessionId, title: &str) -> Result<Option<ChatSession>>;

    /// Most recently updated first.
    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSession>>;

    /// Removes the session and all of its messages.
    async fn delete_session(&self, session_id: SessionId) -> Result<bool>;

    async fn insert_message(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// The newest `limit` messages of a session, returned oldest first.
    async fn recent_messages(&self, session_id: SessionId, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn search_messages(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MessageHit>>;

    async fn insert_memory(&self, entry: NewMemoryEntry) -> Result<SemanticMemoryEntry>;

    async fn search_memories(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MemoryHit>>;

    /// Newest first.
    async fn list_memories(&self, user_id: &str, limit: usize) -> Result<Vec<SemanticMemoryEntry>>;

    /// Cheap round-trip used by readiness probes.
    async fn ping(&self) -> Result<()>;
}
