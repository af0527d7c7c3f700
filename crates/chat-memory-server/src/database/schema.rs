use anyhow::Result;
use tracing::{debug, info};

use super::DbPool;

/// Create the chat tables if they do not exist yet. Idempotent.
///
/// `dimension` fixes the width of both vector columns; it must match the
/// embedding model's output.
pub async fn ensure_schema(pool: &DbPool, dimension: usize) -> Result<()> {
    let pool = pool.get_pool();

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS chat_sessions (
            id UUID PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            auto_titled BOOLEAN NOT NULL DEFAULT TRUE,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"CREATE TABLE IF NOT EXISTS chat_messages (
            id UUID PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            session_id UUID NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
            content TEXT NOT NULL,
            embedding vector({dimension}),
            tokens_used INTEGER,
            model TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"CREATE TABLE IF NOT EXISTS semantic_memories (
            id UUID PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            summary TEXT,
            embedding vector({dimension}) NOT NULL,
            importance REAL NOT NULL CHECK (importance >= 0 AND importance <= 1),
            tags TEXT[] NOT NULL DEFAULT '{{}}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
        )"#
    ))
    .execute(pool)
    .await?;

    // Indices
    let indices = [
        "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, updated_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, created_at DESC, seq DESC)",
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_user ON chat_messages(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_embedding ON chat_messages USING hnsw (embedding vector_cosine_ops)",
        "CREATE INDEX IF NOT EXISTS idx_semantic_memories_user ON semantic_memories(user_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_semantic_memories_embedding ON semantic_memories USING hnsw (embedding vector_cosine_ops)",
    ];

    for ddl in indices {
        debug!("{}", ddl);
        sqlx::query(ddl).execute(pool).await?;
    }

    info!("Chat memory schema ensured (dimension={})", dimension);
    Ok(())
}
