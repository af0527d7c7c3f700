use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, field, info, instrument, warn, Span};

use super::consolidation::MemoryConsolidationEngine;
use super::context_assembler::{ContextAssembler, DEFAULT_SYSTEM_PROMPT};
use super::providers::{ChatStore, Completion, CompletionProvider, EmbeddingProvider, GenerationParams};
use super::session_manager::SessionManager;
use super::similarity_search::{SearchParams, SimilaritySearchService};
use crate::config::{MemoryConfig, Settings};
use crate::database::models::{ChatSession, NewChatMessage};
use crate::models::chat::{ChatRequest, ChatResponse, PromptTurn, Role};
use crate::utils::error::ChatError;
use crate::utils::limiters::Limiters;
use crate::utils::token_estimator::estimate_prompt_tokens;

/// Everything the pipeline reads from configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub memory: MemoryConfig,
    pub default_system_prompt: String,
    pub generation: GenerationParams,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            memory: settings.memory.clone(),
            default_system_prompt: settings.prompts.default_system_prompt.clone(),
            generation: GenerationParams {
                temperature: settings.llm.temperature,
                max_tokens: settings.llm.max_tokens,
            },
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation: GenerationParams {
                temperature: 0.7,
                max_tokens: 1024,
            },
        }
    }
}

/// Single entry point for one user turn. Holds no per-request state; every
/// collaborator is injected.
#[derive(Clone)]
pub struct ConversationOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    store: Arc<dyn ChatStore>,
    search: SimilaritySearchService,
    sessions: SessionManager,
    assembler: ContextAssembler,
    consolidation: MemoryConsolidationEngine,
    limiters: Limiters,
    config: PipelineConfig,
}

impl ConversationOrchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        store: Arc<dyn ChatStore>,
        limiters: Limiters,
        config: PipelineConfig,
    ) -> Self {
        let assembler = ContextAssembler::new(
            config.default_system_prompt.clone(),
            config.memory.history_window,
            config.memory.similar_preview_chars,
        );
        let consolidation = MemoryConsolidationEngine::new(
            embedder.clone(),
            store.clone(),
            limiters.clone(),
            config.memory.persist_threshold,
        );

        Self {
            search: SimilaritySearchService::new(store.clone(), limiters.clone()),
            sessions: SessionManager::new(store.clone()),
            embedder,
            completion,
            store,
            assembler,
            consolidation,
            limiters,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[instrument(skip_all, fields(user_id = %user_id, session_id = field::Empty))]
    pub async fn handle_message(
        &self,
        user_id: &str,
        request: ChatRequest,
    ) -> Result<ChatResponse, ChatError> {
        let start = Instant::now();

        // 1. Validate
        let text = request.message.trim();
        if text.is_empty() {
            return Err(ChatError::InvalidRequest("message must not be empty".into()));
        }

        // 2. Embed the user text
        let query = self
            .embed(text)
            .await
            .map_err(|e| ChatError::EmbeddingUnavailable(format!("{:#}", e)))?;

        // 3. Both retrievals run concurrently and must both finish
        let memory_cfg = &self.config.memory;
        let message_params = SearchParams {
            threshold: memory_cfg.message_similarity_threshold,
            limit: memory_cfg.message_search_limit,
        };
        let memory_params = SearchParams {
            threshold: memory_cfg.memory_similarity_threshold,
            limit: memory_cfg.memory_search_limit,
        };
        let (similar_hits, memory_hits) = tokio::try_join!(
            self.search.search_messages(user_id, &query, message_params),
            self.search.search_memories(user_id, &query, memory_params),
        )
        .map_err(|e| ChatError::StoreReadFailed(format!("similarity search: {:#}", e)))?;

        // 4. Session and history
        let session = self
            .sessions
            .resolve(user_id, request.session_id, text)
            .await?;
        Span::current().record("session_id", field::display(session.id));

        let history = self
            .sessions
            .recent_history(&session, memory_cfg.history_fetch_limit)
            .await?;

        // 5. Assemble
        let context = self.assembler.assemble(
            request.system_prompt.as_deref(),
            &memory_hits,
            &similar_hits,
            &history,
            text,
        );
        let estimated_prompt_tokens = estimate_prompt_tokens(&context.turns);

        // The user message is durable even if the completion below fails
        self.persist_message(&session, user_id, Role::User, text, Some(query), None)
            .await?;

        // 6. Completion
        let completion = self.complete(&context.turns).await?;

        // 7. Assistant message, embedded on its own text
        let assistant_embedding = match self.embed(&completion.text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Assistant reply not embedded, storing without vector: {:#}", e);
                None
            }
        };
        self.persist_message(
            &session,
            user_id,
            Role::Assistant,
            &completion.text,
            assistant_embedding,
            Some(&completion),
        )
        .await?;

        // 8. Consolidation is best-effort
        let memory_stored = match self
            .consolidation
            .consolidate(user_id, text, &completion.text)
            .await
        {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                warn!("Memory consolidation skipped: {:#}", e);
                false
            }
        };

        // 9. Retitle
        if let Err(e) = self.sessions.retitle(&session, text).await {
            warn!("Session retitle skipped: {}", e);
        }

        let tokens_used = completion.tokens_used.unwrap_or(0);
        info!(
            similar_messages = context.usage.similar_messages,
            semantic_memory = context.usage.semantic_memory,
            recent_messages = context.usage.recent_messages,
            tokens_used,
            estimated_prompt_tokens,
            memory_stored,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat turn completed"
        );

        Ok(ChatResponse {
            message: completion.text,
            session_id: session.id,
            tokens_used,
            context_used: context.usage,
        })
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let _permit = self.limiters.embedding_permit().await?;
        self.embedder.embed(text).await
    }

    async fn complete(&self, turns: &[PromptTurn]) -> Result<Completion, ChatError> {
        let _permit = self
            .limiters
            .completion_permit()
            .await
            .map_err(|e| ChatError::CompletionFailed(format!("{:#}", e)))?;

        debug!("Sending {} turns to completion service", turns.len());
        self.completion
            .complete(turns, self.config.generation)
            .await
            .map_err(|e| ChatError::CompletionFailed(format!("{:#}", e)))
    }

    async fn persist_message(
        &self,
        session: &ChatSession,
        user_id: &str,
        role: Role,
        content: &str,
        embedding: Option<Vec<f32>>,
        completion: Option<&Completion>,
    ) -> Result<(), ChatError> {
        let message = NewChatMessage {
            session_id: session.id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            embedding,
            tokens_used: completion
                .and_then(|c| c.tokens_used)
                .and_then(|t| i32::try_from(t).ok()),
            model: completion.and_then(|c| c.model.clone()),
        };

        self.store
            .insert_message(message)
            .await
            .map_err(|e| ChatError::StoreWriteFailed(format!("{} message: {:#}", role, e)))?;
        Ok(())
    }
}
