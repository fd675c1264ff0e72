use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::QueueStatus;

#[derive(Debug)]
pub enum AppError {
    ItemNotFound(i64),
    InvalidUrl(String),
    InvalidStatus(String),
    /// Only `failed` items go back to `pending` by hand.
    NotRequeueable { id: i64, status: QueueStatus },
    SchedulerStopped,
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::ItemNotFound(id) => write!(f, "Queue item {id} not found"),
            AppError::InvalidUrl(msg) => write!(f, "Invalid url: {msg}"),
            AppError::InvalidStatus(msg) => write!(f, "{msg}"),
            AppError::NotRequeueable { id, status } => write!(
                f,
                "Queue item {id} is {status}, only failed items can be requeued"
            ),
            AppError::SchedulerStopped => write!(f, "Sync scheduler is not running"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::ItemNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidUrl(_) | AppError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            AppError::NotRequeueable { .. } => StatusCode::CONFLICT,
            AppError::SchedulerStopped => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                "Internal server error".to_string()
            }
            AppError::SchedulerStopped => {
                tracing::warn!("Sync requested after the scheduler stopped");
                self.to_string()
            }
            other => other.to_string(),
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
