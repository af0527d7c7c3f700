use axum::http::HeaderMap;
use tracing::{debug, warn};

use super::identity::AuthenticatedUser;
use crate::config::SecurityConfig;
use crate::utils::error::ChatError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Checks the shared API key (when configured) and pulls the caller's
/// identity out of the upstream identity header.
#[derive(Debug, Clone)]
pub struct HeaderValidator {
    expected_api_key: Option<String>,
    user_header: String,
}

impl HeaderValidator {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            expected_api_key: config
                .api_key
                .as_ref()
                .filter(|k| !k.is_empty())
                .cloned(),
            user_header: config.user_header.clone(),
        }
    }

    pub fn validate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, ChatError> {
        // 1. X-API-Key
        if let Some(expected) = &self.expected_api_key {
            let api_key = headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ChatError::Unauthorized(format!("Missing {} header", API_KEY_HEADER)))?;

            if api_key != expected {
                warn!("Invalid {}", API_KEY_HEADER);
                return Err(ChatError::Unauthorized(format!("Invalid {}", API_KEY_HEADER)));
            }
        }

        // 2. Caller identity
        let user_id = headers
            .get(self.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ChatError::Unauthorized(format!("Missing {} header", self.user_header)))?;

        debug!("Request authenticated for user {}", user_id);
        Ok(AuthenticatedUser(user_id.to_string()))
    }
}
