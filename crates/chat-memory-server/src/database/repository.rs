use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use super::models::{
    ChatMessage, ChatSession, MemoryHit, MessageHit, NewChatMessage, NewMemoryEntry,
    SemanticMemoryEntry,
};
use super::DbPool;
use crate::models::chat::{Role, SessionId};
use crate::services::conversation::providers::ChatStore;

/// Postgres + pgvector implementation of [`ChatStore`].
///
/// Similarity is `1 - cosine distance`; every user-scoped query filters on
/// `user_id` in SQL so rows of other users never leave the database.
pub struct PgChatStore {
    pool: DbPool,
}

impl PgChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: String,
    title: String,
    auto_titled: bool,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for ChatSession {
    fn from(r: SessionRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            auto_titled: r.auto_titled,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    user_id: String,
    role: String,
    content: String,
    embedding: Option<Vector>,
    tokens_used: Option<i32>,
    model: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            session_id: r.session_id,
            user_id: r.user_id,
            role: r.role.parse()?,
            content: r.content,
            embedding: r.embedding.map(|v| v.to_vec()),
            tokens_used: r.tokens_used,
            model: r.model,
            created_at: r.created_at,
        })
    }
}

#[derive(FromRow)]
struct MessageHitRow {
    id: Uuid,
    session_id: Uuid,
    role: String,
    content: String,
    similarity: f32,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MemoryRow {
    id: Uuid,
    user_id: String,
    content: String,
    summary: Option<String>,
    embedding: Vector,
    importance: f32,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<MemoryRow> for SemanticMemoryEntry {
    fn from(r: MemoryRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            content: r.content,
            summary: r.summary,
            embedding: r.embedding.to_vec(),
            importance: r.importance,
            tags: r.tags,
            created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct MemoryHitRow {
    id: Uuid,
    content: String,
    summary: Option<String>,
    importance: f32,
    tags: Vec<String>,
    similarity: f32,
    created_at: DateTime<Utc>,
}

const SESSION_COLUMNS: &str = "id, user_id, title, auto_titled, metadata, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, session_id, user_id, role, content, embedding, tokens_used, model, created_at";
const MEMORY_COLUMNS: &str =
    "id, user_id, content, summary, embedding, importance, tags, created_at";

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"INSERT INTO chat_sessions (id, user_id, title, auto_titled)
               VALUES ($1, $2, $3, TRUE)
               RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(self.pool.get_pool())
        .await
        .context("Failed to create chat session")?;

        debug!("Created session {} for user {}", row.id, user_id);
        Ok(row.into())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<ChatSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_session_title(
        &self,
        session_id: SessionId,
        title: &str,
        auto_titled: bool,
    ) -> Result<ChatSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"UPDATE chat_sessions
               SET title = $2, auto_titled = $3, updated_at = GREATEST(updated_at, NOW())
               WHERE id = $1
               RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(session_id)
        .bind(title)
        .bind(auto_titled)
        .fetch_optional(self.pool.get_pool())
        .await?
        .with_context(|| format!("Session {} does not exist", session_id))?;

        Ok(row.into())
    }

    async fn retitle_if_auto(&self, session_id: SessionId, title: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"UPDATE chat_sessions
               SET title = $2, updated_at = GREATEST(updated_at, NOW())
               WHERE id = $1 AND auto_titled
               RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(session_id)
        .bind(title)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"SELECT {SESSION_COLUMNS} FROM chat_sessions
               WHERE user_id = $1
               ORDER BY updated_at DESC
               LIMIT $2"#
        ))
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_message(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"INSERT INTO chat_messages
                (id, session_id, user_id, role, content, embedding, tokens_used, model)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {MESSAGE_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(message.session_id)
        .bind(&message.user_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.embedding.map(Vector::from))
        .bind(message.tokens_used)
        .bind(&message.model)
        .fetch_one(self.pool.get_pool())
        .await
        .context("Failed to insert chat message")?;

        row.try_into()
    }

    async fn recent_messages(&self, session_id: SessionId, limit: usize) -> Result<Vec<ChatMessage>> {
        // Newest window first, then flipped back to chronological order
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"SELECT {MESSAGE_COLUMNS} FROM (
                   SELECT {MESSAGE_COLUMNS}, seq FROM chat_messages
                   WHERE session_id = $1
                   ORDER BY created_at DESC, seq DESC
                   LIMIT $2
               ) recent
               ORDER BY created_at ASC, seq ASC"#
        ))
        .bind(session_id)
        .bind(sql_limit(limit))
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn search_messages(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MessageHit>> {
        let rows = sqlx::query_as::<_, MessageHitRow>(
            r#"SELECT id, session_id, role, content, similarity, created_at FROM (
                   SELECT id, session_id, role, content, created_at, seq,
                          (1 - (embedding <=> $2))::float4 AS similarity
                   FROM chat_messages
                   WHERE user_id = $1 AND embedding IS NOT NULL
               ) scored
               WHERE similarity >= $3
               ORDER BY similarity DESC, created_at DESC, seq DESC
               LIMIT $4"#,
        )
        .bind(user_id)
        .bind(Vector::from(query.to_vec()))
        .bind(threshold)
        .bind(sql_limit(limit))
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} similar messages for user {}", rows.len(), user_id);

        rows.into_iter()
            .map(|r| {
                Ok(MessageHit {
                    message_id: r.id,
                    session_id: r.session_id,
                    role: r.role.parse::<Role>()?,
                    content: r.content,
                    similarity: r.similarity,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn insert_memory(&self, entry: NewMemoryEntry) -> Result<SemanticMemoryEntry> {
        let row = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"INSERT INTO semantic_memories
                (id, user_id, content, summary, embedding, importance, tags)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {MEMORY_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&entry.user_id)
        .bind(&entry.content)
        .bind(&entry.summary)
        .bind(Vector::from(entry.embedding))
        .bind(entry.importance.clamp(0.0, 1.0))
        .bind(&entry.tags)
        .fetch_one(self.pool.get_pool())
        .await
        .context("Failed to insert semantic memory")?;

        Ok(row.into())
    }

    async fn search_memories(
        &self,
        user_id: &str,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<MemoryHit>> {
        let rows = sqlx::query_as::<_, MemoryHitRow>(
            r#"SELECT id, content, summary, importance, tags, similarity, created_at FROM (
                   SELECT id, content, summary, importance, tags, created_at, seq,
                          (1 - (embedding <=> $2))::float4 AS similarity
                   FROM semantic_memories
                   WHERE user_id = $1
               ) scored
               WHERE similarity >= $3
               ORDER BY similarity DESC, created_at DESC, seq DESC
               LIMIT $4"#,
        )
        .bind(user_id)
        .bind(Vector::from(query.to_vec()))
        .bind(threshold)
        .bind(sql_limit(limit))
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} semantic memories for user {}", rows.len(), user_id);

        Ok(rows
            .into_iter()
            .map(|r| MemoryHit {
                memory_id: r.id,
                content: r.content,
                summary: r.summary,
                importance: r.importance,
                tags: r.tags,
                similarity: r.similarity,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn list_memories(&self, user_id: &str, limit: usize) -> Result<Vec<SemanticMemoryEntry>> {
        let rows = sqlx::query_as::<_, MemoryRow>(&format!(
            r#"SELECT {MEMORY_COLUMNS} FROM semantic_memories
               WHERE user_id = $1
               ORDER BY created_at DESC, seq DESC
               LIMIT $2"#
        ))
        .bind(user_id)
        .bind(sql_limit(limit))
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
