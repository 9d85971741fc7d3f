use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use orc_core::{Task, TaskStatus};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn is_terminal(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
    )
}

/// `GET /stream/{id}`: server-sent events with types `status`, `log`, `done`, `error`.
///
/// There is no persisted handler-execution log in the data model, so `log` events are
/// derived from run attempts appearing for the task rather than from a dedicated log store.
pub async fn stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    auth::authenticate(&state.store, &state.config.api_key_salt, &headers).await?;

    orc_store::tasks::get(state.store.pool(), id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("task not found"))?;

    let store = state.store.clone();
    let stream = async_stream::stream! {
        let mut last_status: Option<TaskStatus> = None;
        let mut seen_attempts: i32 = 0;

        loop {
            let task: Option<Task> = match orc_store::tasks::get(store.pool(), id).await {
                Ok(t) => t,
                Err(err) => {
                    yield Ok(Event::default().event("error").data(err.to_string()));
                    break;
                }
            };

            let Some(task) = task else {
                yield Ok(Event::default().event("error").data("task not found"));
                break;
            };

            if last_status != Some(task.status) {
                last_status = Some(task.status);
                let body = serde_json::json!({ "status": task.status.as_str() });
                yield Ok(Event::default().event("status").data(body.to_string()));
            }

            if task.retry_count > seen_attempts {
                seen_attempts = task.retry_count;
                let body = serde_json::json!({ "attempt": seen_attempts });
                yield Ok(Event::default().event("log").data(body.to_string()));
            }

            if is_terminal(task.status) {
                let event_name = if task.status == TaskStatus::Failed { "error" } else { "done" };
                let body = serde_json::json!({
                    "status": task.status.as_str(),
                    "last_error": task.last_error,
                });
                yield Ok(Event::default().event(event_name).data(body.to_string()));
                break;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
