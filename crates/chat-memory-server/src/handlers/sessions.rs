use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};

use super::{list_limit, rejected, DEFAULT_LIST_LIMIT};
use crate::models::chat::{ListQuery, MessageView, RenameSessionRequest, SessionId, SessionSummary};
use crate::security::AuthenticatedUser;
use crate::services::conversation::session_manager::HISTORY_FETCH_LIMIT;
use crate::services::conversation::SessionManager;
use crate::utils::error::ChatError;

/// `GET /api/sessions`
pub async fn list_sessions(
    State(sessions): State<SessionManager>,
    user: AuthenticatedUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<SessionSummary>>, ChatError> {
    let Query(query) = query.map_err(rejected)?;
    let limit = list_limit(query.limit, DEFAULT_LIST_LIMIT);
    let list = sessions.list(user.id(), limit).await?;
    Ok(Json(list.into_iter().map(Into::into).collect()))
}

/// `PATCH /api/sessions/{id}`
pub async fn rename_session(
    State(sessions): State<SessionManager>,
    user: AuthenticatedUser,
    path: Result<Path<SessionId>, PathRejection>,
    payload: Result<Json<RenameSessionRequest>, JsonRejection>,
) -> Result<Json<SessionSummary>, ChatError> {
    let Path(session_id) = path.map_err(rejected)?;
    let Json(body) = payload.map_err(rejected)?;

    let session = sessions.rename(user.id(), session_id, &body.title).await?;
    Ok(Json(session.into()))
}

/// `GET /api/sessions/{id}/messages`
pub async fn session_messages(
    State(sessions): State<SessionManager>,
    user: AuthenticatedUser,
    path: Result<Path<SessionId>, PathRejection>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<MessageView>>, ChatError> {
    let Path(session_id) = path.map_err(rejected)?;
    let Query(query) = query.map_err(rejected)?;
    let session = sessions.get_owned(user.id(), session_id).await?;

    let limit = list_limit(query.limit, HISTORY_FETCH_LIMIT);
    let history = sessions.recent_history(&session, limit).await?;
    Ok(Json(history.into_iter().map(Into::into).collect()))
}

/// `DELETE /api/sessions/{id}`
pub async fn delete_session(
    State(sessions): State<SessionManager>,
    user: AuthenticatedUser,
    path: Result<Path<SessionId>, PathRejection>,
) -> Result<StatusCode, ChatError> {
    let Path(session_id) = path.map_err(rejected)?;
    sessions.delete(user.id(), session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
