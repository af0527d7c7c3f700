use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::services::conversation::consolidation::PERSIST_THRESHOLD;
use crate::services::conversation::context_assembler::{
    DEFAULT_SYSTEM_PROMPT, HISTORY_WINDOW, SIMILAR_PREVIEW_CHARS,
};
use crate::services::conversation::session_manager::HISTORY_FETCH_LIMIT;
use crate::services::conversation::similarity_search::{
    MEMORY_SEARCH_LIMIT, MEMORY_SIMILARITY_THRESHOLD, MESSAGE_SEARCH_LIMIT,
    MESSAGE_SIMILARITY_THRESHOLD,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_pool_timeout_seconds")]
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Retrieval, assembly and consolidation knobs.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub message_similarity_threshold: f32,
    pub message_search_limit: usize,
    pub memory_similarity_threshold: f32,
    pub memory_search_limit: usize,
    pub history_fetch_limit: usize,
    pub history_window: usize,
    pub similar_preview_chars: usize,
    pub persist_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            message_similarity_threshold: MESSAGE_SIMILARITY_THRESHOLD,
            message_search_limit: MESSAGE_SEARCH_LIMIT,
            memory_similarity_threshold: MEMORY_SIMILARITY_THRESHOLD,
            memory_search_limit: MEMORY_SEARCH_LIMIT,
            history_fetch_limit: HISTORY_FETCH_LIMIT,
            history_window: HISTORY_WINDOW,
            similar_preview_chars: SIMILAR_PREVIEW_CHARS,
            persist_threshold: PERSIST_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub embedding_concurrency: usize,
    pub store_search_concurrency: usize,
    pub completion_concurrency: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            embedding_concurrency: 16,
            store_search_concurrency: 32,
            completion_concurrency: 8,
            acquire_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret expected in `X-API-Key`; `None` disables the check.
    pub api_key: Option<String>,
    /// Header carrying the already-authenticated user identifier.
    pub user_header: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            user_header: "X-User-Id".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    pub default_system_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

fn default_pool_max_size() -> u32 {
    10
}

fn default_pool_timeout_seconds() -> u64 {
    5
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_tokens() -> usize {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            anyhow::bail!("database.url is required when database.backend = \"postgres\"");
        }
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be greater than zero");
        }
        let thresholds = [
            self.memory.message_similarity_threshold,
            self.memory.memory_similarity_threshold,
            self.memory.persist_threshold,
        ];
        if thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
            anyhow::bail!("memory thresholds must lie within [0, 1]");
        }
        Ok(())
    }
}
