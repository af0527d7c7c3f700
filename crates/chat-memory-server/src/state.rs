use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::security::HeaderValidator;
use crate::services::conversation::{
    ChatStore, CompletionProvider, ConversationOrchestrator, EmbeddingProvider, PipelineConfig,
    SessionManager,
};
use crate::utils::limiters::Limiters;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub sessions: SessionManager,
    pub header_validator: Arc<HeaderValidator>,
}

impl AppState {
    /// Wires the pipeline around already-constructed collaborators.
    pub fn new(
        settings: Settings,
        store: Arc<dyn ChatStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let limiters = Limiters::new(&settings.limits);
        let orchestrator = ConversationOrchestrator::new(
            embedder,
            completion,
            store.clone(),
            limiters,
            PipelineConfig::from_settings(&settings),
        );

        Self {
            sessions: orchestrator.sessions().clone(),
            header_validator: Arc::new(HeaderValidator::new(&settings.security)),
            orchestrator: Arc::new(orchestrator),
            store,
        }
    }
}

impl FromRef<AppState> for Arc<ConversationOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ChatStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
