use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use std::sync::Arc;

use super::{list_limit, rejected, DEFAULT_LIST_LIMIT};
use crate::models::chat::{ListQuery, MemoryView};
use crate::security::AuthenticatedUser;
use crate::services::conversation::ChatStore;
use crate::utils::error::ChatError;

/// `GET /api/memories`: newest first, embeddings omitted.
pub async fn list_memories(
    State(store): State<Arc<dyn ChatStore>>,
    user: AuthenticatedUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<MemoryView>>, ChatError> {
    let Query(query) = query.map_err(rejected)?;
    let limit = list_limit(query.limit, DEFAULT_LIST_LIMIT);
    let memories = store
        .list_memories(user.id(), limit)
        .await
        .map_err(|e| ChatError::StoreReadFailed(format!("list memories: {:#}", e)))?;

    Ok(Json(memories.into_iter().map(Into::into).collect()))
}
