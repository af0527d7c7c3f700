use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session {0} is not owned by the calling user")]
    SessionNotOwned(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable machine-readable kind, used as the `error` field of responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest(_) => "InvalidRequest",
            ChatError::Unauthorized(_) => "Unauthorized",
            ChatError::SessionNotOwned(_) => "SessionNotOwned",
            ChatError::SessionNotFound(_) => "SessionNotFound",
            ChatError::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            ChatError::CompletionFailed(_) => "CompletionFailed",
            ChatError::StoreWriteFailed(_) => "StoreWriteFailed",
            ChatError::StoreReadFailed(_) => "StoreReadFailed",
            ChatError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ChatError::SessionNotOwned(_) => StatusCode::FORBIDDEN,
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::CompletionFailed(_) => StatusCode::BAD_GATEWAY,
            ChatError::StoreWriteFailed(_)
            | ChatError::StoreReadFailed(_)
            | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "{}", message);
        } else {
            tracing::warn!(kind = self.kind(), "{}", message);
        }

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
        });

        (status, body).into_response()
    }
}
