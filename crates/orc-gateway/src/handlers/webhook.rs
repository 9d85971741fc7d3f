use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::webhooks::{check_timestamp_window, verify_signature};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use orc_core::{ClientError, TaskType};
use orc_queue::QueueItem;
use orc_store::inbox::RecordOutcome;
use orc_store::tasks::{NewTask, SubmitOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct WebhookBody {
    external_id: String,
    #[serde(rename = "type")]
    task_type: TaskType,
    payload: Value,
    priority: Option<i32>,
}

fn header(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::from(ClientError::InvalidRequest(format!("missing {name} header"))))
}

/// `POST /webhooks/{source}`: signature check, timestamp window, replay check,
/// then task creation linked to the inbox row — all inside one transaction on accept, so a
/// crash mid-request can never leave the inbox row recorded without a task to show for it.
pub async fn accept(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = header(&headers, "x-signature")?;
    let timestamp: i64 = header(&headers, "x-timestamp")?
        .parse()
        .map_err(|_| ApiError::from(ClientError::InvalidRequest("malformed x-timestamp".into())))?;

    if !verify_signature(&state.config.webhook_secret, timestamp, &body, &signature) {
        return Err(ApiError::from(ClientError::InvalidSignature));
    }

    let now = chrono::Utc::now().timestamp();
    check_timestamp_window(timestamp, now, state.config.replay_window_secs)
        .map_err(ApiError::from)?;

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::from(ClientError::InvalidBody(err.to_string())))?;
    let parsed: WebhookBody = serde_json::from_value(raw.clone())
        .map_err(|err| ApiError::from(ClientError::InvalidBody(err.to_string())))?;

    let mut tx = state.store.pool().begin().await.map_err(ApiError::internal)?;

    let record = orc_store::inbox::record(&mut tx, &source, &parsed.external_id, &signature, &raw)
        .await
        .map_err(ApiError::internal)?;

    let entry = match record {
        RecordOutcome::Duplicate(_) => return Err(ApiError::from(ClientError::ReplayBlocked)),
        RecordOutcome::New(entry) => entry,
    };

    let admission = state
        .admission
        .check(parsed.task_type, 0.0)
        .await
        .map_err(ApiError::internal)?;

    if let Err(err) = admission {
        orc_store::inbox::mark_rejected(&mut tx, entry.id, &err.to_string())
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;
        return Err(ApiError::from(err));
    }

    let new_task = NewTask {
        id: uuid::Uuid::new_v4(),
        task_type: parsed.task_type,
        payload: parsed.payload,
        priority: parsed.priority.unwrap_or(5),
        max_retries: 5,
        idempotency_key: None,
        trace_id: None,
    };

    let outcome = orc_store::tasks::submit(&mut tx, new_task)
        .await
        .map_err(ApiError::internal)?;

    let task = match &outcome {
        SubmitOutcome::Created(task) => task.clone(),
        SubmitOutcome::Existing(task) => task.clone(),
    };

    orc_store::inbox::mark_processed(&mut tx, entry.id, task.id)
        .await
        .map_err(ApiError::internal)?;

    tx.commit().await.map_err(ApiError::internal)?;

    if let SubmitOutcome::Created(task) = outcome {
        state
            .broker
            .enqueue(QueueItem {
                task_id: task.id,
                task_type: task.task_type,
                priority: task.priority,
                enqueued_at: task.enqueued_at,
            })
            .await;
    }

    Ok(StatusCode::ACCEPTED)
}
