use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::error::AppError;
use crate::state::SharedState;
use crate::sync::SyncSignal;

/// Connectivity-restored signal. The run itself happens on the scheduler.
pub async fn trigger(
    State(state): State<SharedState>,
    Json(signal): Json<SyncSignal>,
) -> Result<impl IntoResponse, AppError> {
    if !state.scheduler.register(signal.tag.clone()) {
        return Err(AppError::SchedulerStopped);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "scheduled", "tag": signal.tag })),
    ))
}
