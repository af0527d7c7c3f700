pub mod chat;
pub mod health;
pub mod memories;
pub mod sessions;

use crate::utils::error::ChatError;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// `?limit=` with a default, capped at [`MAX_LIST_LIMIT`]. Zero falls back to the default.
pub(crate) fn list_limit(requested: Option<usize>, default: usize) -> usize {
    match requested {
        Some(0) | None => default,
        Some(n) => n.min(MAX_LIST_LIMIT),
    }
}

/// Extractor rejections become `InvalidRequest` so every error shares one body shape.
pub(crate) fn rejected(rejection: impl std::fmt::Display) -> ChatError {
    ChatError::InvalidRequest(rejection.to_string())
}
