use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use orc_core::{Task, TaskType};
use orc_queue::QueueItem;
use orc_store::tasks::{NewTask, SubmitOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub payload: Value,
    pub priority: Option<i32>,
    pub idempotency_key: Option<String>,
    pub max_retries: Option<i32>,
    pub reserved_cost_usd: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: &'static str,
}

/// `POST /tasks`. Runs the Idempotency Gate first (cheap, no side effect on a known
/// key), then the Admission Controller, then creates the task and enqueues it.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let key = auth::authenticate(&state.store, &state.config.api_key_salt, &headers).await?;
    auth::require_role(&key, orc_core::ApiKeyRole::Service)
        .or_else(|_| auth::require_role(&key, orc_core::ApiKeyRole::Admin))?;

    if let Some(existing_key) = &req.idempotency_key {
        if let Some(existing) = orc_store::tasks::get_by_idempotency_key(state.store.pool(), existing_key)
            .await
            .map_err(ApiError::internal)?
        {
            return Ok((
                StatusCode::CONFLICT,
                Json(SubmitResponse {
                    task_id: existing.id,
                    status: existing.status.as_str(),
                }),
            ));
        }
    }

    let reserved_cost = req.reserved_cost_usd.unwrap_or(0.0);
    state
        .admission
        .check(req.task_type, reserved_cost)
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)?;

    let id = Uuid::new_v4();
    let priority = req.priority.unwrap_or(5);
    let new_task = NewTask {
        id,
        task_type: req.task_type,
        payload: req.payload,
        priority,
        max_retries: req.max_retries.unwrap_or(state.config.task_max_retries),
        idempotency_key: req.idempotency_key,
        trace_id: Some(Uuid::new_v4()),
    };

    let mut tx = state.store.pool().begin().await.map_err(ApiError::internal)?;
    let outcome = orc_store::tasks::submit(&mut tx, new_task)
        .await
        .map_err(ApiError::internal)?;
    tx.commit().await.map_err(ApiError::internal)?;

    let (status_code, task) = match outcome {
        SubmitOutcome::Created(task) => {
            state
                .broker
                .enqueue(QueueItem {
                    task_id: task.id,
                    task_type: task.task_type,
                    priority: task.priority,
                    enqueued_at: task.enqueued_at,
                })
                .await;
            (StatusCode::CREATED, task)
        }
        SubmitOutcome::Existing(task) => (StatusCode::CONFLICT, task),
    };

    Ok((
        status_code,
        Json(SubmitResponse {
            task_id: task.id,
            status: task.status.as_str(),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: &'static str,
    pub retry_count: i32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            status: task.status.as_str(),
            retry_count: task.retry_count,
            started_at: task.started_at,
            completed_at: task.completed_at,
            last_error: task.last_error,
        }
    }
}

/// `GET /tasks/{id}`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    auth::authenticate(&state.store, &state.config.api_key_salt, &headers).await?;

    let task = orc_store::tasks::get(state.store.pool(), id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("task not found"))?;

    Ok(Json(task.into()))
}
