pub mod clients;
pub mod queue;
pub mod sync;

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Queue
        .route("/api/v1/queue", get(queue::list).post(queue::create))
        .route("/api/v1/queue/{id}", get(queue::get).delete(queue::delete))
        .route("/api/v1/queue/{id}/requeue", post(queue::requeue))
        // Trigger
        .route("/api/v1/sync", post(sync::trigger))
}

pub fn client_routes() -> Router<SharedState> {
    Router::new().route("/ws", get(clients::connect))
}
