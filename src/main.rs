use std::net::SocketAddr;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use quickadd_sync::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting quickadd-sync");

    let pool = quickadd_sync::db::connect(&config.database_url)
        .await
        .expect("Failed to open queue database");

    tracing::info!("Migrations applied");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let addr = SocketAddr::new(config.host, config.port);
    let (app, state, scheduler) = quickadd_sync::build_app(pool, config, shutdown_rx)
        .expect("Failed to build HTTP client");

    // Pick up anything left over from a previous process.
    state.request_sync();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    tracing::info!("Waiting for the sync scheduler to finish");
    if let Err(e) = scheduler.await {
        tracing::error!("Sync scheduler task failed: {e}");
    }
    state.pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
