pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod models;
pub mod hub;
pub mod sync;
pub mod scheduler;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::hub::ClientHub;
use crate::state::{AppState, SharedState};
use crate::sync::{ClientCredentials, Deliverer, QueueProcessor, RaindropClient, SyncGate};

/// Build the router and start the sync scheduler, delivering to the configured remote API.
///
/// The returned handle finishes once `shutdown` flips and any run in progress has completed.
pub fn build_app(
    pool: SqlitePool,
    config: Config,
    shutdown: watch::Receiver<bool>,
) -> Result<(Router, SharedState, JoinHandle<()>), reqwest::Error> {
    let deliverer = Arc::new(RaindropClient::new(
        config.api_base.clone(),
        config.delivery_timeout,
    )?);
    Ok(build_app_with(pool, config, deliverer, shutdown))
}

pub fn build_app_with(
    pool: SqlitePool,
    config: Config,
    deliverer: Arc<dyn Deliverer>,
    shutdown: watch::Receiver<bool>,
) -> (Router, SharedState, JoinHandle<()>) {
    let hub = Arc::new(ClientHub::new());

    let credentials = Arc::new(ClientCredentials::new(hub.clone(), config.token_timeout));
    let processor = QueueProcessor::new(pool.clone(), credentials, deliverer, hub.clone())
        .with_stale_after(config.stale_syncing_after);
    let gate = Arc::new(SyncGate::new(config.sync_tag.clone(), Arc::new(processor)));

    let (scheduler, task) = scheduler::spawn(gate, config.retry.clone(), shutdown);

    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        hub,
        scheduler,
    });

    let app = Router::new()
        .merge(routes::api_routes())
        .merge(routes::client_routes())
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state, task)
}

async fn health() -> &'static str {
    "ok"
}
