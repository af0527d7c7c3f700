use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::state::AppState;
use crate::utils::error::ChatError;

/// Validates headers and attaches the [`AuthenticatedUser`](super::AuthenticatedUser)
/// for downstream extractors.
pub async fn security_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ChatError> {
    let user = state.header_validator.validate(request.headers())?;
    debug!("{} {} as {}", request.method(), request.uri().path(), user.id());

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
