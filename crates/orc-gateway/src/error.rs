use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use orc_core::ClientError;

/// HTTP-facing error. Wraps the stable `ClientError` taxonomy plus an internal
/// catch-all.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: "internal error".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }
}

/// Maps each stable client error code to an HTTP status. Webhook codes (`invalid_signature`
/// 401, `replay_blocked` 409, `replay_window_exceeded` 408) and the task-submission duplicate
/// code (409) are fixed by convention; `budget_exceeded`/`queue_full`/`circuit_open` are resolved
/// in DESIGN.md as 422/503/503 respectively (terminal-but-not-malformed vs. temporarily-unavailable).
impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let status = match &err {
            ClientError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ClientError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ClientError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ClientError::ReplayBlocked => StatusCode::CONFLICT,
            ClientError::ReplayWindowExceeded => StatusCode::REQUEST_TIMEOUT,
            ClientError::BudgetExceeded => StatusCode::UNPROCESSABLE_ENTITY,
            ClientError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ClientError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(serde_json::json!({ "error": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
