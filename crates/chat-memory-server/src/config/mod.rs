pub mod settings;

pub use settings::{
    DatabaseConfig, EmbeddingConfig, LimitsConfig, LlmConfig, MemoryConfig, PromptsConfig,
    SecurityConfig, ServerConfig, Settings, StoreBackend,
};
