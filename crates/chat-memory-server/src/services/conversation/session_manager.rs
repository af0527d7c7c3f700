use std::sync::Arc;
use tracing::{debug, info};

use super::providers::ChatStore;
use crate::database::models::{ChatMessage, ChatSession};
use crate::models::chat::SessionId;
use crate::utils::error::ChatError;
use crate::utils::text::truncate_with_ellipsis;

pub const TITLE_MAX_CHARS: usize = 50;
pub const HISTORY_FETCH_LIMIT: usize = 10;

/// Title derived from a user message: its first 50 characters, ellipsized
/// when anything was cut.
pub fn derive_title(message: &str) -> String {
    truncate_with_ellipsis(message, TITLE_MAX_CHARS)
}

/// Session lifecycle: resolve-or-create, ownership checks, auto-titling and
/// chronological history windows.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn ChatStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Load the caller's session, or open a new auto-titled one when no id
    /// was supplied.
    pub async fn resolve(
        &self,
        user_id: &str,
        session_id: Option<SessionId>,
        first_message: &str,
    ) -> Result<ChatSession, ChatError> {
        match session_id {
            Some(id) => self.get_owned(user_id, id).await,
            None => {
                let title = derive_title(first_message);
                let session = self
                    .store
                    .create_session(user_id, &title)
                    .await
                    .map_err(|e| ChatError::StoreWriteFailed(format!("create session: {:#}", e)))?;

                info!("Created session {} for user {}", session.id, user_id);
                Ok(session)
            }
        }
    }

    /// Loads a session and checks it belongs to `user_id`.
    pub async fn get_owned(
        &self,
        user_id: &str,
        session_id: SessionId,
    ) -> Result<ChatSession, ChatError> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| ChatError::StoreReadFailed(format!("load session: {:#}", e)))?
            .ok_or(ChatError::SessionNotFound(session_id))?;

        if !session.is_owned_by(user_id) {
            return Err(ChatError::SessionNotOwned(session_id));
        }

        Ok(session)
    }

    /// Regenerates the title from the latest user message. Returns `None`
    /// for sessions the user has renamed by hand, including a rename that
    /// lands after `session` was loaded.
    pub async fn retitle(
        &self,
        session: &ChatSession,
        latest_user_message: &str,
    ) -> Result<Option<ChatSession>, ChatError> {
        if !session.auto_titled {
            return Ok(None);
        }

        let title = derive_title(latest_user_message);
        let updated = self
            .store
            .retitle_if_auto(session.id, &title)
            .await
            .map_err(|e| ChatError::StoreWriteFailed(format!("retitle session: {:#}", e)))?;

        match &updated {
            Some(s) => debug!("Retitled session {} to {:?}", s.id, s.title),
            None => debug!("Session {} was renamed meanwhile, title kept", session.id),
        }
        Ok(updated)
    }

    /// Manual rename. Clears the auto-titled flag for good.
    pub async fn rename(
        &self,
        user_id: &str,
        session_id: SessionId,
        title: &str,
    ) -> Result<ChatSession, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::InvalidRequest("title must not be empty".into()));
        }

        let session = self.get_owned(user_id, session_id).await?;
        self.store
            .update_session_title(session.id, title, false)
            .await
            .map_err(|e| ChatError::StoreWriteFailed(format!("rename session: {:#}", e)))
    }

    /// The newest `limit` messages, oldest first.
    pub async fn recent_history(
        &self,
        session: &ChatSession,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.store
            .recent_messages(session.id, limit)
            .await
            .map_err(|e| ChatError::StoreReadFailed(format!("load history: {:#}", e)))
    }

    pub async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<ChatSession>, ChatError> {
        self.store
            .list_sessions(user_id, limit)
            .await
            .map_err(|e| ChatError::StoreReadFailed(format!("list sessions: {:#}", e)))
    }

    pub async fn delete(&self, user_id: &str, session_id: SessionId) -> Result<(), ChatError> {
        let session = self.get_owned(user_id, session_id).await?;
        let removed = self
            .store
            .delete_session(session.id)
            .await
            .map_err(|e| ChatError::StoreWriteFailed(format!("delete session: {:#}", e)))?;

        if !removed {
            return Err(ChatError::SessionNotFound(session_id));
        }

        info!("Deleted session {} for user {}", session_id, user_id);
        Ok(())
    }
}
