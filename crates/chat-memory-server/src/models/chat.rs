use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Already-authenticated user identifier handed to the pipeline.
pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => anyhow::bail!("Unknown message role: {}", other),
        }
    }
}

/// One `{role, content}` turn sent to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: Role,
    pub content: String,
}

impl PromptTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

// ===== RESPONSE MODELS =====

/// How many retrieved items informed an answer. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUsage {
    pub similar_messages: usize,
    pub semantic_memory: usize,
    pub recent_messages: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub session_id: SessionId,
    pub tokens_used: u32,
    pub context_used: ContextUsage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub auto_titled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub tokens_used: Option<i32>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryView {
    pub id: Uuid,
    pub summary: Option<String>,
    pub importance: f32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_text() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn test_chat_request_accepts_camel_case() {
        let raw = r#"{"message":"hi","sessionId":"6f1c1f2e-7d0e-4a8e-9a43-2a8f3c9b1e11","systemPrompt":"be brief"}"#;
        let req: ChatRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.session_id.is_some());
        assert_eq!(req.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn test_chat_response_shape() {
        let resp = ChatResponse {
            message: "ok".into(),
            session_id: Uuid::nil(),
            tokens_used: 12,
            context_used: ContextUsage {
                similar_messages: 1,
                semantic_memory: 2,
                recent_messages: 3,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["tokensUsed"], 12);
        assert_eq!(json["contextUsed"]["semanticMemory"], 2);
        assert_eq!(json["contextUsed"]["recentMessages"], 3);
        assert_eq!(json["sessionId"], Uuid::nil().to_string());
    }
}
