use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::tasks::TaskResponse;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use orc_core::{ApiKeyRole, TaskType};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DlqQuery {
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `GET /admin/dlq` — lists tasks that exhausted `max_retries`, visible via an admin
/// endpoints"). Admin-only.
pub async fn list_dlq(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<DlqQuery>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let key = auth::authenticate(&state.store, &state.config.api_key_salt, &headers).await?;
    auth::require_role(&key, ApiKeyRole::Admin)?;

    let tasks = orc_dispatcher::dlq::list(&state.store, q.task_type, q.limit.unwrap_or(100))
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// `POST /admin/dlq/{id}/requeue` — the operator drain tool for the dead-letter queue.
pub async fn requeue_dlq(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let key = auth::authenticate(&state.store, &state.config.api_key_salt, &headers).await?;
    auth::require_role(&key, ApiKeyRole::Admin)?;

    orc_dispatcher::dlq::requeue(&state.store, &state.broker, id)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(serde_json::json!({ "requeued": id })))
}
