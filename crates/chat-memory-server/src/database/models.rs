use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::chat::{MemoryView, MessageView, Role, SessionId, SessionSummary, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub title: String,
    /// True until the user renames the session by hand.
    pub auto_titled: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl From<ChatSession> for SessionSummary {
    fn from(s: ChatSession) -> Self {
        Self {
            id: s.id,
            title: s.title,
            auto_titled: s.auto_titled,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// A persisted message. Append-only: never edited after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    /// `None` only when the embedding service failed for this message; such
    /// rows are never returned by similarity search.
    pub embedding: Option<Vec<f32>>,
    pub tokens_used: Option<i32>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            tokens_used: m.tokens_used,
            model: m.model,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: Role,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub tokens_used: Option<i32>,
    pub model: Option<String>,
}

/// Consolidated long-term memory. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMemoryEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub content: String,
    pub summary: Option<String>,
    pub embedding: Vec<f32>,
    pub importance: f32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SemanticMemoryEntry> for MemoryView {
    fn from(m: SemanticMemoryEntry) -> Self {
        Self {
            id: m.id,
            summary: m.summary,
            importance: m.importance,
            tags: m.tags,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMemoryEntry {
    pub user_id: UserId,
    pub content: String,
    pub summary: Option<String>,
    pub embedding: Vec<f32>,
    pub importance: f32,
    pub tags: Vec<String>,
}

/// A past message that cleared the similarity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHit {
    pub message_id: Uuid,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub similarity: f32,
    pub created_at: DateTime<Utc>,
}

/// A memory entry that cleared the similarity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub memory_id: Uuid,
    pub content: String,
    pub summary: Option<String>,
    pub importance: f32,
    pub tags: Vec<String>,
    pub similarity: f32,
    pub created_at: DateTime<Utc>,
}

impl MemoryHit {
    /// Summary when one exists, otherwise the raw exchange.
    pub fn display_text(&self) -> &str {
        match self.summary.as_deref() {
            Some(summary) if !summary.trim().is_empty() => summary,
            _ => &self.content,
        }
    }
}

/// Ranking shared by every hit type: similarity descending, newest first on ties.
pub trait RankedHit {
    fn similarity(&self) -> f32;
    fn created_at(&self) -> DateTime<Utc>;
}

impl RankedHit for MessageHit {
    fn similarity(&self) -> f32 {
        self.similarity
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl RankedHit for MemoryHit {
    fn similarity(&self) -> f32 {
        self.similarity
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(summary: Option<&str>) -> MemoryHit {
        MemoryHit {
            memory_id: Uuid::new_v4(),
            content: "User: a\nAssistant: b".into(),
            summary: summary.map(String::from),
            importance: 0.7,
            tags: vec![],
            similarity: 0.9,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_text_prefers_summary() {
        assert_eq!(hit(Some("short")).display_text(), "short");
    }

    #[test]
    fn test_display_text_falls_back_to_content() {
        assert_eq!(hit(None).display_text(), "User: a\nAssistant: b");
        assert_eq!(hit(Some("  ")).display_text(), "User: a\nAssistant: b");
    }
}
