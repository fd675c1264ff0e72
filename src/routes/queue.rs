use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use crate::db;
use crate::error::AppError;
use crate::models::QueueStatus;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateRequest {
    pub url: String,
}

pub async fn list(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let items = match params.status.as_deref() {
        Some(status) => {
            let status: QueueStatus = status.parse().map_err(AppError::InvalidStatus)?;
            db::queue::list_by_status(&state.pool, status).await?
        }
        None => db::queue::list_all(&state.pool).await?,
    };

    let counts: serde_json::Map<String, serde_json::Value> =
        db::queue::count_by_status(&state.pool)
            .await?
            .into_iter()
            .map(|(status, count)| (status.to_string(), json!(count)))
            .collect();

    Ok(Json(json!({
        "items": items,
        "counts": counts,
    })))
}

pub async fn create(
    State(state): State<SharedState>,
    Json(req): Json<CreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let url = req.url.trim();
    let parsed = Url::parse(url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::InvalidUrl(
            "only http and https links can be queued".to_string(),
        ));
    }

    let item = db::queue::enqueue(&state.pool, url).await?;
    tracing::info!("Queued item {}: {}", item.id, item.url);

    state.request_sync();

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let item = db::queue::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::ItemNotFound(id))?;
    Ok(Json(item))
}

pub async fn delete(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !db::queue::delete(&state.pool, id).await? {
        return Err(AppError::ItemNotFound(id));
    }
    tracing::info!("Removed item {id} from queue");
    Ok(StatusCode::NO_CONTENT)
}

/// Give a `failed` item another chance.
pub async fn requeue(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(item) = db::queue::requeue_failed(&state.pool, id).await? {
        tracing::info!("Requeued item {id}");
        state.request_sync();
        return Ok(Json(item));
    }

    match db::queue::find_by_id(&state.pool, id).await? {
        Some(item) => Err(AppError::NotRequeueable {
            id,
            status: item.status,
        }),
        None => Err(AppError::ItemNotFound(id)),
    }
}
